//! LLM backend, image inlining and augmented-mode routing.

pub mod images;
pub mod model;
pub mod routing;

pub use images::ImageFetcher;
pub use model::{CompletionBackend, CompletionRequest, OpenAiBackend};
pub use routing::ToolRoutingPolicy;
