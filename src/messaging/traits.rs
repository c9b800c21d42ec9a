//! Platform collaborator traits consumed by the relay.

use crate::EventId;
use crate::error::Result;

use async_trait::async_trait;

/// A message that preceded the triggering event in the same channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: EventId,
    pub author: String,
    pub content: String,
}

/// Read-only, bounded lookback over a channel's recent messages.
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Up to `limit` messages posted in `channel_id` before `before`, oldest first.
    async fn messages_before(
        &self,
        channel_id: u64,
        before: EventId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>>;
}

/// Outbound side of one inbound event.
///
/// `reply` keeps the quote/thread linkage to the trigger; `follow_up` posts a
/// plain message in the same conversation.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;

    async fn follow_up(&self, text: &str) -> Result<()>;
}

/// History accessor for events that have no surrounding chatter (slash commands).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

#[async_trait]
impl ChannelHistory for NoHistory {
    async fn messages_before(
        &self,
        _channel_id: u64,
        _before: EventId,
        _limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        Ok(Vec::new())
    }
}
