//! Decides whether an inbound message is addressed to the bot.

use crate::{BotIdentity, InboundMessage};

/// Which mention forms engage the bot.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerPolicy {
    /// Also engage when a role held by the bot is mentioned.
    pub role_mentions: bool,
}

impl TriggerPolicy {
    pub fn new(role_mentions: bool) -> Self {
        Self { role_mentions }
    }

    /// True when the message explicitly mentions the bot and was not written
    /// by the bot itself or another automated account.
    pub fn should_engage(&self, message: &InboundMessage, bot: &BotIdentity) -> bool {
        if message.author_is_bot || message.author_id == bot.user_id {
            return false;
        }

        if message.mentions.contains(&bot.user_id) {
            return true;
        }

        self.role_mentions
            && message
                .role_mentions
                .iter()
                .any(|role_id| bot.role_ids.contains(role_id))
    }
}
