//! System prompt and fixed user-facing text.

use crate::error::Result;
use anyhow::Context as _;
use std::path::Path;

/// Default system prompt sent with every completion.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, knowledgeable AI assistant.
You answer questions from users on a Discord server.
- Keep answers concise and easy to follow.
- Reply in the language the user writes in.
- Format code as Markdown code blocks.
- If you don't know something, say so honestly.";

/// Header placed above the transcript of preceding channel messages.
pub const CHANNEL_CONTEXT_HEADER: &str = "[Recent messages in this channel, for context]";

/// Header separating the transcript from the message addressed to the bot.
pub const QUESTION_HEADER: &str = "[Message addressed to you]";

/// Question used when the user sent only an image.
pub const IMAGE_ONLY_QUESTION: &str = "Please describe this image.";

/// What gets stored as the user turn for an image-only question.
pub const IMAGE_ONLY_HISTORY_TEXT: &str = "[image]";

/// Reply to a bare mention with nothing to answer.
pub const EMPTY_MENTION_REPLY: &str = "Please ask me something!";

/// Sent in place of an empty completion so the platform never gets a blank message.
pub const EMPTY_COMPLETION_REPLY: &str = "(no response)";

pub const HISTORY_CLEARED: &str = "Conversation history cleared!";
pub const HISTORY_ALREADY_EMPTY: &str = "There was no history to clear.";

/// Presence text shown under the bot's name.
pub const PRESENCE_TEXT: &str = "@mention me";

/// Short notice shown to users when handling fails.
pub fn error_notice(category: &str) -> String {
    format!("An error occurred: {category}")
}

/// Load a system prompt override from disk.
pub async fn load_prompt_file(path: &Path) -> Result<String> {
    let prompt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to load prompt file: {}", path.display()))?;
    Ok(prompt.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_notice_names_only_the_category() {
        assert_eq!(error_notice("ApiError"), "An error occurred: ApiError");
    }

    #[tokio::test]
    async fn prompt_file_is_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("SYSTEM.md");
        std::fs::write(&path, "\n  Be brief.\n\n").expect("write prompt");

        let prompt = load_prompt_file(&path).await.expect("prompt loads");
        assert_eq!(prompt, "Be brief.");
    }

    #[tokio::test]
    async fn missing_prompt_file_is_an_error() {
        let error = load_prompt_file(Path::new("/nonexistent/SYSTEM.md"))
            .await
            .expect_err("missing file must fail");
        assert!(error.to_string().contains("failed to load prompt file"));
    }
}
