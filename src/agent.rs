//! Per-event pipeline: trigger, dedup, relay to the model, reply.

pub mod dedup;
pub mod relay;
pub mod trigger;

pub use dedup::DedupGuard;
pub use relay::{Outcome, Relay};
pub use trigger::TriggerPolicy;
