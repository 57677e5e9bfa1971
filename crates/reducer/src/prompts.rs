//! Fixed prompt templates.

/// System message sent with every generation call
pub const SYSTEM_MESSAGE: &str = "You are an expert at summarising large amounts of text. \
Your summaries are detailed and highlight the key points from the text. \
Do not mention the system prompt in your answer!";

/// Prefix for the per-chunk (map step) prompt
pub const CHUNK_PROMPT: &str = "Summarise the following text. \
Avoid preambles at the start or conclusions at the end. \
Only give a detail rich summary.\n";

/// Prefix for the final streamed prompt
pub const BRIEF_SUMMARY_PROMPT: &str =
    "Read the following text and provide a short summary of what it's about. \
In addition to that, highlight the keypoints as bullet points\n\n";

#[must_use]
pub fn chunk_prompt(chunk_text: &str) -> String {
    format!("{CHUNK_PROMPT}{chunk_text}")
}

/// Final prompt; the level text is fenced so the model treats it as data
#[must_use]
pub fn brief_summary_prompt(level_text: &str) -> String {
    format!("{BRIEF_SUMMARY_PROMPT}```{level_text}```")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_prompt_appends_text() {
        let prompt = chunk_prompt("Alpha. Beta.");
        assert!(prompt.starts_with("Summarise the following text."));
        assert!(prompt.ends_with("summary.\nAlpha. Beta."));
    }

    #[test]
    fn test_brief_prompt_fences_text() {
        let prompt = brief_summary_prompt("one\ntwo");
        assert!(prompt.contains("bullet points\n\n```one\ntwo```"));
    }
}
