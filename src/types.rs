//! Core type definitions for artfuse

use crate::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base64 text of a PNG image, ready to embed in a JSON body
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap text that is already base64-encoded image data
    ///
    /// No validation happens here. Chat-completion backends expect the output
    /// of [`crate::image::normalize`]; the local model server also accepts an
    /// unresized upload.
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Base64 text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `data:` URL form used by chat-completion image parts
    pub fn data_url(&self) -> String {
        format!("data:image/png;base64,{}", self.0)
    }

    /// Length of the base64 text in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the base64 text is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Images run to megabytes of base64; keep logs readable.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.0.len())
    }
}

/// One completion call: prompt, optional image, model, and sampling values
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Prompt text
    pub prompt: String,
    /// Normalized image attached after the prompt
    pub image: Option<EncodedImage>,
    /// Model identifier
    pub model: String,
    /// Maximum tokens for completion
    pub max_tokens: u32,
    /// Temperature for sampling
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
}

impl CompletionRequest {
    /// Create a text-only request using the given generation settings
    pub fn new(prompt: impl Into<String>, generation: &GenerationConfig) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            model: generation.model.clone(),
            max_tokens: generation.max_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
        }
    }

    /// Attach an image
    pub fn with_image(mut self, image: EncodedImage) -> Self {
        self.image = Some(image);
        self
    }
}
