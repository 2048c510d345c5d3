pub mod openai_compat;
pub mod scripted;
pub mod traits;

// Re-exports for convenience.
pub use openai_compat::OpenAiCompatClient;
pub use scripted::ScriptedClient;
pub use traits::{ModelClient, ToolChoice};
