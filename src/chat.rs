//! Chat-completions client (OpenAI, OpenRouter, and compatible gateways)

use crate::config::{GenerationConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::types::CompletionRequest;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Client for a chat-completions endpoint
pub struct ChatCompletionClient {
    /// HTTP client
    client: Client,
    /// Connection settings
    config: ProviderConfig,
    /// Model and sampling settings
    generation: GenerationConfig,
}

impl ChatCompletionClient {
    /// Create a new client; the provider must carry a credential
    pub fn new(config: ProviderConfig, generation: GenerationConfig) -> Result<Self> {
        if config.credential().is_none() {
            return Err(Error::config(format!(
                "no API key configured for {}",
                config.endpoint
            )));
        }
        generation.validate()?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            generation,
        })
    }

    async fn post(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionBody::from_request(request);
        let api_key = self.config.credential().unwrap_or_default();

        tracing::debug!(
            endpoint = %self.config.endpoint,
            model = %request.model,
            with_image = request.image.is_some(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.config.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "chat completion rejected");
            return Err(Error::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }
}

/// Extract `choices[0].message.content`, trimmed
pub fn parse_response(body: &str) -> Result<String> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| Error::malformed(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed("response contained no choices"))?;

    choice
        .message
        .content
        .map(|content| content.trim().to_string())
        .ok_or_else(|| Error::malformed("first choice has no message content"))
}

#[async_trait]
impl LlmClient for ChatCompletionClient {
    async fn send(&self, request: CompletionRequest) -> Result<String> {
        self.post(&request).await
    }

    fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    fn client_type(&self) -> &str {
        "chat_completion"
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.as_str()
    }
}

/// Chat-completions request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionBody {
    /// Model identifier
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens for completion
    pub max_tokens: u32,
    /// Temperature for sampling
    pub temperature: f32,
    /// Top-p sampling
    pub top_p: f32,
}

impl ChatCompletionBody {
    /// Single user message: the prompt text, then the image if one is attached
    pub fn from_request(request: &CompletionRequest) -> Self {
        let mut content = vec![ContentPart::Text {
            text: request.prompt.clone(),
        }];
        if let Some(image) = &request.image {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                    detail: ImageDetail::High,
                },
            });
        }

        Self {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Ordered content parts
    pub content: Vec<ContentPart>,
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// One part of a multi-part message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// Image given as a URL (here always a `data:` URL)
    ImageUrl {
        /// Image location and detail level
        image_url: ImageUrl,
    },
}

/// Image reference inside an `image_url` part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL or `data:` URL
    pub url: String,
    /// Requested detail level
    pub detail: ImageDetail,
}

/// Vision detail level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    /// Low resolution pass
    Low,
    /// High resolution pass
    High,
    /// Provider decides
    Auto,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
