//! Local model server client with streamed line responses
//!
//! Talks to an Ollama-style server: `POST /api/generate` and `POST /api/pull`
//! both answer with one JSON object per line until the connection closes.
//!
//! # Quick Start
//!
//! ```bash
//! ollama serve
//! ollama pull llava
//! export LOCAL_MODEL_URL=http://localhost:11434
//! ```
//!
//! ```rust,no_run
//! # async fn run() -> artfuse::Result<()> {
//! use artfuse::{GenerationConfig, LocalModelClient, ProviderConfig};
//!
//! let base = url::Url::parse("http://localhost:11434").unwrap();
//! let client = LocalModelClient::new(ProviderConfig::local(base), GenerationConfig::new("llava"))?;
//! let text = client.generate_completion("Describe impressionism").await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{GenerationConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::stream::LineStream;
use crate::types::{CompletionRequest, EncodedImage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Instruction sent with [`LocalModelClient::analyze_image`]
pub const ANALYZE_IMAGE_PROMPT: &str = "Describe the image in detail, focusing on foreground and \
background objects, composition, color palette, lighting, body types, and gender expressions.";

/// Client for a local model server
pub struct LocalModelClient {
    /// HTTP client
    client: Client,
    /// Connection settings
    config: ProviderConfig,
    /// Model and sampling settings
    generation: GenerationConfig,
}

impl LocalModelClient {
    /// Create a new local client
    pub fn new(config: ProviderConfig, generation: GenerationConfig) -> Result<Self> {
        generation.validate()?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            generation,
        })
    }

    /// Generate text for `prompt`, concatenating every streamed fragment
    pub async fn generate_completion(&self, prompt: &str) -> Result<String> {
        self.generate(&self.generation.model, prompt, None).await
    }

    /// Describe an image with the fixed analysis instruction
    ///
    /// The server accepts images at their uploaded resolution, so `image` may
    /// be a plain base64 encoding of the upload rather than a normalized one.
    pub async fn analyze_image(&self, image: &EncodedImage) -> Result<String> {
        self.generate(&self.generation.model, ANALYZE_IMAGE_PROMPT, Some(image))
            .await
    }

    /// Ask the server to download `name`; returns the status lines joined by `\n`
    pub async fn pull_model(&self, name: &str) -> Result<String> {
        tracing::info!(model = %name, endpoint = %self.config.endpoint, "pulling model");

        let lines = self.post_stream("api/pull", &PullBody { name }).await?;
        let mut statuses = Vec::new();
        lines
            .fold(|chunk: PullChunk| statuses.extend(chunk.status))
            .await?;

        Ok(statuses.join("\n"))
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: Option<&EncodedImage>,
    ) -> Result<String> {
        let body = GenerateBody {
            model,
            prompt,
            images: image.map(|i| vec![i.as_str()]),
            stream: true,
        };

        tracing::debug!(
            endpoint = %self.config.endpoint,
            model = %model,
            with_image = image.is_some(),
            "sending generate request"
        );

        let lines = self.post_stream("api/generate", &body).await?;
        let mut text = String::new();
        lines
            .fold(|chunk: GenerateChunk| text.push_str(&chunk.response))
            .await?;

        Ok(text)
    }

    async fn post_stream<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<LineStream> {
        let url = format!(
            "{}/{}",
            self.config.endpoint.as_str().trim_end_matches('/'),
            path
        );

        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!(status = status.as_u16(), url = %url, "local model request rejected");
            return Err(Error::Status {
                status: status.as_u16(),
                body: error_text,
            });
        }

        Ok(LineStream::new(response.bytes_stream()))
    }
}

#[async_trait]
impl LlmClient for LocalModelClient {
    async fn send(&self, request: CompletionRequest) -> Result<String> {
        self.generate(&request.model, &request.prompt, request.image.as_ref())
            .await
    }

    fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    fn client_type(&self) -> &str {
        "local"
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.as_str()
    }
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PullBody<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct PullChunk {
    #[serde(default)]
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use url::Url;

    fn client_for(server: &mockito::ServerGuard) -> LocalModelClient {
        let base = Url::parse(&server.url()).unwrap();
        LocalModelClient::new(ProviderConfig::local(base), GenerationConfig::new("llava")).unwrap()
    }

    #[tokio::test]
    async fn test_generate_concatenates_fragments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::Json(json!({
                "model": "llava",
                "prompt": "greet",
                "stream": true
            })))
            .with_status(200)
            .with_body("{\"response\":\"Hello\"}\n{\"response\":\" world\"}\n")
            .create_async()
            .await;

        let text = client_for(&server).generate_completion("greet").await.unwrap();

        assert_eq!(text, "Hello world");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_final_metadata_line_is_ignored() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(
                "{\"response\":\"Hi\",\"done\":false}\n{\"done\":true,\"total_duration\":1234}\n",
            )
            .create_async()
            .await;

        let text = client_for(&server).generate_completion("x").await.unwrap();
        assert_eq!(text, "Hi");
    }

    #[tokio::test]
    async fn test_malformed_line_aborts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("{\"response\":\"Hello\"}\n{\"response\": oops\n{\"response\":\"more\"}\n")
            .create_async()
            .await;

        let err = client_for(&server)
            .generate_completion("x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StreamDecode { .. }));
    }

    #[tokio::test]
    async fn test_analyze_image_sends_instruction_and_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::Json(json!({
                "model": "llava",
                "prompt": ANALYZE_IMAGE_PROMPT,
                "images": ["iVBORw0KGgo="],
                "stream": true
            })))
            .with_status(200)
            .with_body("{\"response\":\"A cat.\"}\n")
            .create_async()
            .await;

        let image = EncodedImage::from_base64("iVBORw0KGgo=");
        let text = client_for(&server).analyze_image(&image).await.unwrap();

        assert_eq!(text, "A cat.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body("model \"llava\" not found")
            .create_async()
            .await;

        let err = client_for(&server)
            .generate_completion("x")
            .await
            .unwrap_err();
        match err {
            Error::Status { status, body } => {
                assert_eq!(status, 404);
                assert!(body.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pull_model_joins_statuses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/pull")
            .match_body(Matcher::Json(json!({"name": "llava"})))
            .with_status(200)
            .with_body(
                "{\"status\":\"pulling manifest\"}\n\
                 {\"digest\":\"sha256:abc\",\"total\":10,\"completed\":5}\n\
                 {\"status\":\"success\"}\n",
            )
            .create_async()
            .await;

        let log = client_for(&server).pull_model("llava").await.unwrap();

        assert_eq!(log, "pulling manifest\nsuccess");
        mock.assert_async().await;
    }
}
