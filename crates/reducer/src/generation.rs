use crate::error::GenerationError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Boxed stream of text fragments returned by [`GenerationPort::generate_stream`]
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Text-generation backend.
///
/// Both calls take a system message and a user prompt. Implementations own
/// their transport concerns (timeouts, retries); the reducer never retries.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// Generate the full response and return it at once
    async fn generate_once(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;

    /// Start a generation and return its fragments in emission order
    async fn generate_stream(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<FragmentStream, GenerationError>;

    /// Backend label for logs (e.g. `ollama:llama3`)
    fn name(&self) -> &str;
}
