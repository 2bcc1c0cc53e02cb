//! Collaborators the routing core calls into, and the registry that holds them.
//!
//! The core only sees the traits in [`traits`]. The bundled HTTP clients
//! (Ollama and OpenAI-compatible APIs) sit behind feature flags.

mod http;
pub mod registry;
pub mod retry;
pub mod traits;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "remote")]
pub mod openai_compat;

pub use registry::ProviderRegistry;
pub use retry::{RetryConfig, RetryingDiscovery};
pub use traits::{GenerateProvider, HealthProbe, ModelDiscovery, ProbeReport};

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
#[cfg(feature = "remote")]
pub use openai_compat::OpenAiCompatProvider;
