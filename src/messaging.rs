//! Messaging platform plumbing: Discord adapter, mention parsing, chunked delivery.

pub mod chunk;
pub mod discord;
pub mod mentions;
pub mod traits;

pub use traits::{ChannelHistory, Responder};
