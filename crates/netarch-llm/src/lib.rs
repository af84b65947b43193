pub mod client;
pub mod drain;
pub mod mock;
pub mod prompts;
pub mod provider;
pub mod sse;

pub use client::CompletionClient;
pub use drain::{drain, StreamControl};
pub use mock::{MockProvider, MockResponse};
pub use provider::{OpenAiCompatProvider, ProviderConfig};
