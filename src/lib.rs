//! # artfuse
//!
//! Prompt-engineering pipeline for image generation: pick an art style,
//! describe it, describe a source image, recommend an artist, fuse all of it
//! into one rich prompt, then compact that into a short diffusion prompt.
//!
//! Every stage can run against any configured backend:
//!
//! - **Chat completions** (OpenAI, OpenRouter): one JSON request, one JSON reply
//! - **Local model server**: `/api/generate` answering with newline-delimited JSON
//!
//! Images are normalized to about one megapixel and sent as base64 PNG.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use artfuse::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> artfuse::Result<()> {
//!     init_tracing(LogFormat::from_env());
//!
//!     let config = PipelineConfig::from_env()?;
//!     let pipeline = Pipeline::from_config(&config);
//!     let client = config.client(Backend::OpenRouter, Stage::StyleDescription)?;
//!
//!     let text = pipeline
//!         .run_display(&client, StageInput::StyleDescription { style: "Cubism".into() }, false)
//!         .await;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod error;
pub mod image;
pub mod llm_client;
pub mod local;
pub mod pipeline;
pub mod stream;
pub mod telemetry;
pub mod types;

// Re-exports for convenience
pub use chat::ChatCompletionClient;
pub use config::{Backend, GenerationConfig, PipelineConfig, ProtocolKind, ProviderConfig};
pub use error::{Error, Result};
pub use llm_client::{CompletionClient, LlmClient};
pub use local::LocalModelClient;
pub use pipeline::{render, Pipeline, Stage, StageInput};
pub use telemetry::{init_tracing, LogFormat};
pub use types::{CompletionRequest, EncodedImage};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{Backend, GenerationConfig, PipelineConfig, ProviderConfig};
    pub use crate::error::{Error, Result};
    pub use crate::image::{normalize, normalize_bytes};
    pub use crate::llm_client::{CompletionClient, LlmClient};
    pub use crate::pipeline::{Pipeline, Stage, StageInput};
    pub use crate::telemetry::{init_tracing, LogFormat};
    pub use crate::types::{CompletionRequest, EncodedImage};
}
