//! Prompts sent to the vision model by [`crate::naming::LlmNameSuggester`].
//!
//! Kept in one place so the wording can be tuned without touching the
//! request or sanitising logic.

/// System prompt for the archive-naming request.
pub const NAMING_SYSTEM_PROMPT: &str = "You name documents. You reply with a single \
short file name and nothing else.";

/// User prompt sent together with the first exported page.
pub const NAMING_PROMPT: &str = r#"Analyze this image (the first page of a PDF document).
Generate a very short, concise snake_case file name for this document based on its title or content.

Rules:
- lowercase words joined by underscores, e.g. quarterly_sales_report
- at most five words
- Return ONLY the file name: no extension, no quotes, no markdown, no explanation"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn naming_prompt_asks_for_bare_snake_case() {
        assert!(NAMING_PROMPT.contains("snake_case"));
        assert!(NAMING_PROMPT.contains("no extension"));
        assert!(!NAMING_SYSTEM_PROMPT.is_empty());
    }
}
