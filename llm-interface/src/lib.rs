//! Turns fetched activity into a persona prompt and sends it to the model.

pub mod gemini;
pub mod prompt;

pub use gemini::{GeminiProvider, PROVIDER_NAME};
pub use prompt::{Prompt, PromptBuilder, DEFAULT_SNIPPET_CHARS};

use persona_core::CoreError;

/// Anything that can turn a prompt into persona text.
pub trait PersonaRequester {
    async fn request_persona(&self, prompt: &Prompt) -> Result<String, CoreError>;
}
