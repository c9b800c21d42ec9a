//! Conversation memory and context assembly.

pub mod context;
pub mod store;

pub use context::{AssembledContext, ContextAssembler};
pub use store::{ConversationMemory, ConversationRecord, ConversationStore};
