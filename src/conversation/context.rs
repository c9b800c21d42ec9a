//! Context assembly: preceding channel chatter + the question + its images.

use crate::messaging::traits::{ChannelHistory, HistoryMessage};
use crate::prompts;
use crate::{Attachment, EventId, ImageRef};

/// Model-facing user turn for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    /// Transcript prefix (if any) followed by the question.
    pub user_text: String,
    pub images: Vec<ImageRef>,
}

/// Builds the user turn sent to the model.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    lookback: usize,
}

impl ContextAssembler {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }

    /// Assemble the user turn for an event.
    ///
    /// `cleaned_text` is the event text with mention tokens removed. A failed
    /// history read only loses the transcript prefix.
    pub async fn assemble(
        &self,
        history: &dyn ChannelHistory,
        channel_id: u64,
        event_id: EventId,
        cleaned_text: &str,
        attachments: &[Attachment],
    ) -> AssembledContext {
        let preceding = if self.lookback == 0 {
            Vec::new()
        } else {
            match history
                .messages_before(channel_id, event_id, self.lookback)
                .await
            {
                Ok(messages) => messages,
                Err(error) => {
                    tracing::warn!(channel_id, %error, "failed to read channel history, continuing without it");
                    Vec::new()
                }
            }
        };

        let preceding: Vec<_> = preceding
            .into_iter()
            .filter(|message| message.id != event_id)
            .collect();

        let images = image_refs(attachments);
        let question = if cleaned_text.is_empty() && !attachments.is_empty() {
            prompts::IMAGE_ONLY_QUESTION
        } else {
            cleaned_text
        };

        let mut user_text = render_transcript(&preceding);
        user_text.push_str(question);

        AssembledContext { user_text, images }
    }
}

/// Render preceding messages as a labeled transcript block, or an empty string
/// when there is nothing to show.
pub fn render_transcript(messages: &[HistoryMessage]) -> String {
    let lines: Vec<String> = messages
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .map(|message| format!("{}: {}", message.author, message.content.trim()))
        .collect();

    if lines.is_empty() {
        return String::new();
    }

    format!(
        "{}\n{}\n\n{}\n",
        prompts::CHANNEL_CONTEXT_HEADER,
        lines.join("\n"),
        prompts::QUESTION_HEADER
    )
}

/// Attachments whose declared content type is an image.
pub fn image_refs(attachments: &[Attachment]) -> Vec<ImageRef> {
    attachments
        .iter()
        .filter(|attachment| attachment.is_image())
        .map(|attachment| ImageRef {
            url: attachment.url.clone(),
            content_type: attachment.content_type.clone().unwrap_or_default(),
        })
        .collect()
}
