//! Prompt construction for the generation worker

/// Speaker label the model uses for itself
const SELF_LABEL: &str = "I";

fn header(template: &str, username: &str) -> String {
    template.replace("{username}", username)
}

/// Build a prompt asking the model to reply to the user
///
/// Includes the trailing `1 + 2 * context_turns` utterances. Labels are
/// anchored at the end of the log: the last utterance belongs to the user,
/// the one before it to the model, and so on.
pub fn build_reply_prompt(
    template: &str,
    log: &[String],
    context_turns: usize,
    username: &str,
) -> String {
    let mut prompt = header(template, username);
    let window = 1 + 2 * context_turns;
    let start = log.len().saturating_sub(window);
    let tail = &log[start..];

    for (idx, utterance) in tail.iter().enumerate() {
        let from_end = tail.len() - 1 - idx;
        let speaker = if from_end % 2 == 0 { username } else { SELF_LABEL };
        prompt.push_str(&format!("{speaker}: {utterance}\n"));
    }

    prompt.push_str(SELF_LABEL);
    prompt.push_str(": ");
    prompt
}

/// Build a prompt asking the model to continue its own broadcast
pub fn broadcast_prompt(
    template: &str,
    log: &[String],
    context_turns: usize,
    username: &str,
) -> String {
    let mut prompt = header(template, username);
    let start = log.len().saturating_sub(context_turns);

    for utterance in &log[start..] {
        prompt.push_str(&format!("{SELF_LABEL}: {utterance}\n"));
    }

    prompt.push_str(SELF_LABEL);
    prompt.push_str(": ");
    prompt
}

/// Clean up raw model output into a single speakable line
///
/// Cuts after the last full stop (when it is not the first character) and
/// keeps only the text after the last `I: ` marker.
pub fn tidy_utterance(raw: &str) -> String {
    let mut text = raw;
    let cut;
    if let Some(idx) = raw.rfind('.').filter(|idx| *idx > 0) {
        cut = format!("{}.", &raw[..idx]);
        text = &cut;
    }

    let marker = format!("{SELF_LABEL}: ");
    text.rsplit(marker.as_str())
        .next()
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// Keep only the trailing `budget` characters of an oversized prompt
///
/// Lossy: the template header is the first thing to go.
pub fn truncate_prompt(prompt: &str, budget: usize) -> String {
    let total = prompt.chars().count();
    if total <= budget {
        return prompt.to_string();
    }
    prompt.chars().skip(total - budget).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reply_prompt_labels() {
        let prompt = build_reply_prompt(
            "Chat with {username}.\n",
            &log(&["hi", "hello", "how are you"]),
            5,
            "Ana",
        );
        assert_eq!(
            prompt,
            "Chat with Ana.\nAna: hi\nI: hello\nAna: how are you\nI: "
        );
    }

    #[test]
    fn test_reply_prompt_window() {
        let prompt = build_reply_prompt("", &log(&["a", "b", "c", "d", "e"]), 1, "U");
        assert_eq!(prompt, "U: c\nI: d\nU: e\nI: ");
    }

    #[test]
    fn test_reply_prompt_even_log_ends_with_user() {
        // An unanswered turn left by a failed generation
        let prompt = build_reply_prompt("", &log(&["seed", "lost", "again"]), 5, "U");
        assert!(prompt.ends_with("U: again\nI: "));
    }

    #[test]
    fn test_broadcast_prompt() {
        let prompt = broadcast_prompt(
            "Radio for {username}\n",
            &log(&["one", "two", "three"]),
            2,
            "U",
        );
        assert_eq!(prompt, "Radio for U\nI: two\nI: three\nI: ");
    }

    #[test]
    fn test_tidy_cuts_after_last_stop() {
        assert_eq!(
            tidy_utterance("Nice weather today. And then som"),
            "Nice weather today."
        );
    }

    #[test]
    fn test_tidy_keeps_text_after_marker() {
        assert_eq!(tidy_utterance("U: hi\nI: Hello there."), "Hello there.");
        assert_eq!(tidy_utterance("  no stop here "), "no stop here");
    }

    #[test]
    fn test_truncate_prompt() {
        assert_eq!(truncate_prompt("abcdef", 3), "def");
        assert_eq!(truncate_prompt("abc", 10), "abc");
        assert_eq!(truncate_prompt("héllo", 4), "éllo");
    }
}
