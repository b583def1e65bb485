//! Unified completion capability over every supported backend protocol

use crate::chat::ChatCompletionClient;
use crate::config::{GenerationConfig, ProtocolKind, ProviderConfig};
use crate::error::Result;
use crate::local::LocalModelClient;
use crate::types::{CompletionRequest, EncodedImage};
use async_trait::async_trait;

/// Unified trait for LLM clients (both hosted and local)
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Perform one request and reduce the response to text
    async fn send(&self, request: CompletionRequest) -> Result<String>;

    /// Generation settings the client was built with
    fn generation(&self) -> &GenerationConfig;

    /// Get the client type for debugging/logging
    fn client_type(&self) -> &str;

    /// Chat-completions URL (hosted) or server base URL (local)
    fn endpoint(&self) -> &str;

    /// Build a request from the client's own generation settings and send it
    async fn complete(&self, prompt: &str, image: Option<EncodedImage>) -> Result<String> {
        let mut request = CompletionRequest::new(prompt, self.generation());
        request.image = image;
        self.send(request).await
    }
}

/// A client for any configured backend, chosen once from its [`ProtocolKind`]
pub enum CompletionClient {
    /// Chat-completions API (OpenAI, OpenRouter)
    Chat(ChatCompletionClient),
    /// Local model server with streamed line responses
    Local(LocalModelClient),
}

impl CompletionClient {
    /// Build the client matching `provider.protocol`
    pub fn from_config(provider: ProviderConfig, generation: GenerationConfig) -> Result<Self> {
        match provider.protocol {
            ProtocolKind::ChatCompletion => {
                ChatCompletionClient::new(provider, generation).map(Self::Chat)
            }
            ProtocolKind::LineStreamedGenerate => {
                LocalModelClient::new(provider, generation).map(Self::Local)
            }
        }
    }

    /// The local client, when this is one
    pub fn as_local(&self) -> Option<&LocalModelClient> {
        match self {
            Self::Local(client) => Some(client),
            Self::Chat(_) => None,
        }
    }
}

#[async_trait]
impl LlmClient for CompletionClient {
    async fn send(&self, request: CompletionRequest) -> Result<String> {
        match self {
            Self::Chat(client) => client.send(request).await,
            Self::Local(client) => client.send(request).await,
        }
    }

    fn generation(&self) -> &GenerationConfig {
        match self {
            Self::Chat(client) => client.generation(),
            Self::Local(client) => client.generation(),
        }
    }

    fn client_type(&self) -> &str {
        match self {
            Self::Chat(client) => client.client_type(),
            Self::Local(client) => client.client_type(),
        }
    }

    fn endpoint(&self) -> &str {
        match self {
            Self::Chat(client) => client.endpoint(),
            Self::Local(client) => client.endpoint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use url::Url;

    #[test]
    fn test_variant_selected_by_protocol() {
        let hosted = ProviderConfig::openrouter("sk-test").unwrap();
        let client = CompletionClient::from_config(hosted, GenerationConfig::new("m")).unwrap();
        assert_eq!(client.client_type(), "chat_completion");
        assert!(client.as_local().is_none());

        let local = ProviderConfig::local(Url::parse("http://localhost:11434").unwrap());
        let client = CompletionClient::from_config(local, GenerationConfig::new("llava")).unwrap();
        assert_eq!(client.client_type(), "local");
        assert_eq!(client.endpoint(), "http://localhost:11434/");
        assert_eq!(client.generation().model, "llava");
    }

    #[test]
    fn test_hosted_provider_needs_credential() {
        let mut hosted = ProviderConfig::openai("unused").unwrap();
        hosted.credential = None;
        let err = CompletionClient::from_config(hosted, GenerationConfig::new("m"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_complete_uses_client_settings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "llava",
                "prompt": "Describe a sunset",
                "stream": true
            })))
            .with_status(200)
            .with_body("{\"response\":\"Orange\"}\n")
            .create_async()
            .await;

        let local = ProviderConfig::local(Url::parse(&server.url()).unwrap());
        let client = CompletionClient::from_config(local, GenerationConfig::new("llava")).unwrap();
        let text = client.complete("Describe a sunset", None).await.unwrap();

        assert_eq!(text, "Orange");
        mock.assert_async().await;
    }
}
