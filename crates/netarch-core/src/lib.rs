pub mod errors;
pub mod ids;
pub mod module;
pub mod provider;

pub use errors::CompletionError;
pub use ids::{ConversationId, SessionToken, UserId};
pub use module::{MasteryLevel, Module};
pub use provider::{ChatMessage, ChatRole, CompletionProvider, CompletionRequest, TextStream};
