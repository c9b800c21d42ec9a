//! The relay: one inbound event in, one chunked answer out.
//!
//! Per event the steps run in a fixed order: trigger, dedup, mention
//! stripping, context assembly, routing, backend call, store append, delivery.
//! A failed exchange is never written to the conversation store.

use crate::agent::dedup::DedupGuard;
use crate::agent::trigger::TriggerPolicy;
use crate::config::Config;
use crate::conversation::{ContextAssembler, ConversationMemory};
use crate::error::Result;
use crate::llm::model::{CompletionBackend, CompletionRequest};
use crate::llm::routing::ToolRoutingPolicy;
use crate::messaging::chunk;
use crate::messaging::mentions::strip_mentions;
use crate::messaging::traits::{ChannelHistory, NoHistory, Responder};
use crate::prompts;
use crate::{Attachment, BotIdentity, ConversationKey, EventId, InboundMessage};

use std::sync::Arc;
use std::time::Duration;

/// What happened to an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not addressed to the bot.
    Ignored,
    /// Already handled within the dedup window.
    Duplicate,
    /// Addressed to the bot but carried nothing to answer.
    Prompted,
    Answered { chunks: usize, augmented: bool },
    /// Handling failed; the user was shown a notice naming `category`.
    Failed { category: &'static str },
}

/// A `/ask` invocation.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub interaction_id: EventId,
    pub channel_id: u64,
    pub user_id: u64,
    pub question: String,
    pub image: Option<Attachment>,
    /// Explicit web search choice; `None` leaves it to the keyword policy.
    pub search: Option<bool>,
}

/// Shared, long-lived pipeline state. Cheap to share behind an `Arc`.
pub struct Relay {
    store: Arc<dyn ConversationMemory>,
    backend: Arc<dyn CompletionBackend>,
    dedup: DedupGuard,
    trigger: TriggerPolicy,
    context: ContextAssembler,
    routing: ToolRoutingPolicy,
    system_prompt: String,
    max_message_length: usize,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("trigger", &self.trigger)
            .field("routing", &self.routing)
            .field("max_message_length", &self.max_message_length)
            .finish_non_exhaustive()
    }
}

impl Relay {
    pub fn new(
        store: impl ConversationMemory + 'static,
        backend: Arc<dyn CompletionBackend>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            store: Arc::new(store),
            backend,
            dedup: DedupGuard::default(),
            trigger: TriggerPolicy::default(),
            context: ContextAssembler::new(3),
            routing: ToolRoutingPolicy::default(),
            system_prompt: system_prompt.into(),
            max_message_length: crate::config::DISCORD_MAX_MESSAGE_LENGTH,
        }
    }

    pub fn from_config(
        config: &Config,
        store: impl ConversationMemory + 'static,
        backend: Arc<dyn CompletionBackend>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            dedup: DedupGuard::new(Duration::from_secs(config.history.dedup_window_secs)),
            trigger: TriggerPolicy::new(config.discord.role_mention_trigger),
            context: ContextAssembler::new(config.discord.context_messages),
            routing: ToolRoutingPolicy::from_settings(&config.routing),
            max_message_length: config.discord.max_message_length,
            ..Self::new(store, backend, system_prompt)
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerPolicy) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_routing(mut self, routing: ToolRoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_max_message_length(mut self, max_message_length: usize) -> Self {
        self.max_message_length = max_message_length;
        self
    }

    pub fn trigger(&self) -> TriggerPolicy {
        self.trigger
    }

    /// Handle a channel message. Every failure is reported to the user as a
    /// short notice and to the log in full; nothing is returned as an error.
    #[tracing::instrument(skip(self, message, bot, history, responder), fields(channel_id = message.channel_id, message_id = message.id))]
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        bot: &BotIdentity,
        history: &dyn ChannelHistory,
        responder: &dyn Responder,
    ) -> Outcome {
        if !self.trigger.should_engage(message, bot) {
            return Outcome::Ignored;
        }
        if !self.dedup.accept(message.id) {
            return Outcome::Duplicate;
        }

        tracing::info!(author = %message.author_name, "handling mention");

        let cleaned = strip_mentions(&message.content, &message.mentions, &message.role_mentions);
        if cleaned.is_empty() && message.attachments.is_empty() {
            if let Err(error) = responder.reply(prompts::EMPTY_MENTION_REPLY).await {
                tracing::warn!(%error, "failed to send empty-mention prompt");
            }
            return Outcome::Prompted;
        }

        self.answer(
            message.conversation_key(),
            message.id,
            &cleaned,
            &message.attachments,
            None,
            history,
            responder,
        )
        .await
    }

    /// Handle `/ask`. No channel chatter is included.
    #[tracing::instrument(skip(self, request, responder), fields(channel_id = request.channel_id, interaction_id = request.interaction_id))]
    pub async fn handle_ask(&self, request: &AskRequest, responder: &dyn Responder) -> Outcome {
        if !self.dedup.accept(request.interaction_id) {
            return Outcome::Duplicate;
        }

        let question = request.question.trim();
        let attachments: Vec<Attachment> = request
            .image
            .iter()
            .filter(|attachment| attachment.is_image())
            .cloned()
            .collect();

        if question.is_empty() && attachments.is_empty() {
            if let Err(error) = responder.reply(prompts::EMPTY_MENTION_REPLY).await {
                tracing::warn!(%error, "failed to send empty-question prompt");
            }
            return Outcome::Prompted;
        }

        self.answer(
            ConversationKey::new(request.channel_id, request.user_id),
            request.interaction_id,
            question,
            &attachments,
            request.search,
            &NoHistory,
            responder,
        )
        .await
    }

    /// Forget a conversation. Returns whether anything was stored.
    pub async fn clear(&self, key: ConversationKey) -> Result<bool> {
        self.store.clear(key).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn answer(
        &self,
        key: ConversationKey,
        event_id: EventId,
        cleaned: &str,
        attachments: &[Attachment],
        search_override: Option<bool>,
        history: &dyn ChannelHistory,
        responder: &dyn Responder,
    ) -> Outcome {
        match self
            .exchange(key, event_id, cleaned, attachments, search_override, history, responder)
            .await
        {
            Ok((chunks, augmented)) => {
                tracing::info!(conversation = %key, chunks, augmented, "answer delivered");
                Outcome::Answered { chunks, augmented }
            }
            Err(error) => {
                let category = error.category();
                tracing::error!(conversation = %key, %error, category, "failed to answer");
                if let Err(notice_error) = responder.reply(&prompts::error_notice(category)).await {
                    tracing::warn!(%notice_error, "failed to send error notice");
                }
                Outcome::Failed { category }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn exchange(
        &self,
        key: ConversationKey,
        event_id: EventId,
        cleaned: &str,
        attachments: &[Attachment],
        search_override: Option<bool>,
        history: &dyn ChannelHistory,
        responder: &dyn Responder,
    ) -> Result<(usize, bool)> {
        let context = self
            .context
            .assemble(history, key.channel_id, event_id, cleaned, attachments)
            .await;

        let prior_turns = match self.store.get_history(key).await {
            Ok(turns) => turns,
            Err(error) => {
                tracing::warn!(conversation = %key, %error, "failed to read history, continuing without it");
                Vec::new()
            }
        };

        let augmented = self.routing.should_use_augmented_mode(
            cleaned,
            search_override,
            !context.images.is_empty(),
        );

        let reply = self
            .backend
            .complete(CompletionRequest {
                system_prompt: self.system_prompt.clone(),
                history: prior_turns,
                user_text: context.user_text,
                images: context.images,
                augmented,
            })
            .await?;

        let stored_user_text = if cleaned.is_empty() {
            prompts::IMAGE_ONLY_HISTORY_TEXT
        } else {
            cleaned
        };
        self.store
            .append_exchange(key, stored_user_text, &reply)
            .await?;

        let chunks = chunk::dispatch(responder, &reply, self.max_message_length).await?;
        Ok((chunks, augmented))
    }
}
