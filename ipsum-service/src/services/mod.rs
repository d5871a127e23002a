pub mod metrics;
pub mod mistral;
pub mod prompt;
pub mod sse;
pub mod text;

pub use mistral::{MistralClient, ProviderError, TextStream};
