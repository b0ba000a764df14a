//! Conversation log owned by the controller

/// Ordered, append-only list of utterances
///
/// Turns alternate loosely between the user and the system; radio seeds may
/// be system-only. The log is only ever replaced wholesale on a mode switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<String>,
}

impl ConversationLog {
    /// Start a log from a seed
    pub fn seeded(seed: &[String]) -> Self {
        Self {
            turns: seed.to_vec(),
        }
    }

    pub fn push(&mut self, utterance: impl Into<String>) {
        self.turns.push(utterance.into());
    }

    /// Discard every turn and start again from `seed`
    pub fn replace(&mut self, seed: &[String]) {
        self.turns = seed.to_vec();
    }

    pub fn turns(&self) -> &[String] {
        &self.turns
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&str> {
        self.turns.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Every turn joined as one utterance, one line per turn
    pub fn joined(&self) -> String {
        self.turns.join("\n")
    }
}
