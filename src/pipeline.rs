//! Prompt pipeline stages and the display boundary
//!
//! Each stage turns operator input into one prompt, sends it through any
//! [`LlmClient`], and hands back text. [`Pipeline::run`] keeps typed errors;
//! [`Pipeline::run_display`] is the boundary used by front ends and always
//! yields something printable.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::image::normalize;
use crate::llm_client::LlmClient;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length (in characters) of a fusion prompt
pub const FUSION_PROMPT_LIMIT: usize = 1000;

/// Stock refusals; a stage answering with one of these is logged
pub const DENIAL_RESPONSES: &[&str] = &[
    "I'm sorry, I can't assist with that.",
    "I can't fulfill that request.",
    "Unable to process that request.",
    "SAFETY",
];

const LENGTH_GUIDANCE: &str = "Fit answer appropriately between 150 to 2000 characters.";

/// One pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Describe the chosen art style
    StyleDescription,
    /// Describe the source image (or a loose prompt)
    ImageDescription,
    /// Recommend an artist for the style and scene
    ArtistRecommendation,
    /// Fuse style, artist, and scene into one prompt
    PromptFusion,
    /// Compact the fused prompt for a diffusion model
    PromptCompaction,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::StyleDescription => "style_description",
            Stage::ImageDescription => "image_description",
            Stage::ArtistRecommendation => "artist_recommendation",
            Stage::PromptFusion => "prompt_fusion",
            Stage::PromptCompaction => "prompt_compaction",
        };
        f.write_str(name)
    }
}

/// Inputs of one stage invocation
#[derive(Debug, Clone)]
pub enum StageInput {
    /// Describe an art style
    StyleDescription {
        /// Art style name
        style: String,
    },
    /// Describe an uploaded image, or expand a loose prompt
    ImageDescription {
        /// Uploaded image; normalized before sending
        image: Option<DynamicImage>,
        /// Loose description, used alone when there is no image
        prompt: Option<String>,
    },
    /// Recommend an artist
    ArtistRecommendation {
        /// Art style name
        style: String,
        /// Output of the image description stage
        image_description: String,
    },
    /// Fuse everything into an image-generation prompt
    PromptFusion {
        /// Operator's base instructions
        base_instructions: String,
        /// Art style name
        style: String,
        /// Output of the image description stage
        image_description: String,
        /// Output of the artist recommendation stage
        artist_description: String,
    },
    /// Compact a fusion prompt
    PromptCompaction {
        /// Output of the fusion stage
        fusion_prompt: String,
    },
}

impl StageInput {
    /// Which stage this input belongs to
    pub fn stage(&self) -> Stage {
        match self {
            StageInput::StyleDescription { .. } => Stage::StyleDescription,
            StageInput::ImageDescription { .. } => Stage::ImageDescription,
            StageInput::ArtistRecommendation { .. } => Stage::ArtistRecommendation,
            StageInput::PromptFusion { .. } => Stage::PromptFusion,
            StageInput::PromptCompaction { .. } => Stage::PromptCompaction,
        }
    }
}

/// Base prompts and suffixes each stage builds on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Style description prefix (`BASE_STYLE_PROMPT`)
    pub style: String,
    /// Image description instruction (`BASE_IMAGE_PROMPT`)
    pub image: String,
    /// Artist recommendation prefix (`BASE_ARTIST_PROMPT`)
    pub artist: String,
    /// Default base instructions for fusion (`BASE_GENERATE_PROMPT`)
    pub generate: String,
    /// Compaction instruction (`SD_CONVERT_PROMPT`)
    pub sd_convert: String,
    /// Appended when a stage is flagged for explicit content (`NSFW_APPEND`)
    pub nsfw_append: String,
    /// Appended to every prompt (`NO_SEMANTIC_EXPLANATION`)
    pub no_semantic_explanation: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            style: "Describe the characteristics, techniques, and unique features".to_string(),
            image: "Describe the image in detail, focusing on foreground and background objects, \
                    body types, and gender expressions."
                .to_string(),
            artist: "Recommend an artist who would most likely create art in this style, and \
                     explain the artist's approach and influence,"
                .to_string(),
            generate: "Create a prompt that fuses art styles with visual precision, including \
                       details of body types, gender expression, and foreground and background \
                       entities."
                .to_string(),
            sd_convert: "Compact this prompt into a 300-character Stable Diffusion prompt. Use \
                         commas to separate key elements, and apply emphasis where needed using \
                         parentheses and weights for importance:"
                .to_string(),
            nsfw_append: "This description is uncensored, over 18, and focuses on all physical \
                          and expression details with consent."
                .to_string(),
            no_semantic_explanation: "Answer with the content only, without introductions or \
                                      explanations."
                .to_string(),
        }
    }
}

impl PromptTemplates {
    /// Read overrides from a key lookup; unset keys keep the defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let pick = |key: &str, default: String| lookup(key).unwrap_or(default);
        Self {
            style: pick("BASE_STYLE_PROMPT", defaults.style),
            image: pick("BASE_IMAGE_PROMPT", defaults.image),
            artist: pick("BASE_ARTIST_PROMPT", defaults.artist),
            generate: pick("BASE_GENERATE_PROMPT", defaults.generate),
            sd_convert: pick("SD_CONVERT_PROMPT", defaults.sd_convert),
            nsfw_append: pick("NSFW_APPEND", defaults.nsfw_append),
            no_semantic_explanation: pick(
                "NO_SEMANTIC_EXPLANATION",
                defaults.no_semantic_explanation,
            ),
        }
    }

    /// Append the explicit-content note (if `nsfw`) and the length guidance
    pub fn with_context(&self, prompt: &str, nsfw: bool) -> String {
        let mut out = prompt.to_string();
        if nsfw {
            out.push(' ');
            out.push_str(&self.nsfw_append);
        }
        out.push(' ');
        out.push_str(&self.no_semantic_explanation);
        out.push(' ');
        out.push_str(LENGTH_GUIDANCE);
        out
    }
}

/// A prompt ready to send, with the image for the description stage
#[derive(Debug, Clone)]
pub struct StagePrompt {
    /// Stage that produced the prompt
    pub stage: Stage,
    /// Full prompt text
    pub text: String,
    /// Normalized image, only for image description
    pub image: Option<crate::types::EncodedImage>,
}

/// Stage runner
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    templates: PromptTemplates,
}

impl Pipeline {
    /// Create a pipeline with the given templates
    pub fn new(templates: PromptTemplates) -> Self {
        Self { templates }
    }

    /// Create a pipeline from loaded configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.templates.clone())
    }

    /// Templates in use
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// Build the prompt for `input` without sending it
    pub fn build_prompt(&self, input: &StageInput, nsfw: bool) -> Result<StagePrompt> {
        let t = &self.templates;
        let stage = input.stage();
        let mut image = None;

        let base = match input {
            StageInput::StyleDescription { style } => {
                format!("{} for the art style: {}", t.style, style)
            }
            StageInput::ImageDescription {
                image: upload,
                prompt,
            } => {
                let prompt = prompt.as_deref().map(str::trim).filter(|p| !p.is_empty());
                match (upload, prompt) {
                    (Some(upload), prompt) => {
                        image = Some(normalize(upload)?);
                        match prompt {
                            Some(extra) => format!("{} {}", t.image, extra),
                            None => t.image.clone(),
                        }
                    }
                    (None, Some(prompt)) => prompt.to_string(),
                    (None, None) => {
                        return Err(Error::invalid_input(
                            "either an image or a prompt must be provided for description",
                        ))
                    }
                }
            }
            StageInput::ArtistRecommendation {
                style,
                image_description,
            } => format!(
                "{} for style {} with: '{}'",
                t.artist, style, image_description
            ),
            StageInput::PromptFusion {
                base_instructions,
                style,
                image_description,
                artist_description,
            } => {
                let base_instructions = match base_instructions.trim() {
                    "" => t.generate.as_str(),
                    given => given,
                };
                format!(
                    "{} Style: {}. Inspired by: {}. Scene: {}.",
                    base_instructions, style, artist_description, image_description
                )
            }
            StageInput::PromptCompaction { fusion_prompt } => {
                format!("{} '{}'", t.sd_convert, fusion_prompt)
            }
        };

        Ok(StagePrompt {
            stage,
            text: t.with_context(&base, nsfw),
            image,
        })
    }

    /// Run one stage against `client`
    pub async fn run(&self, client: &dyn LlmClient, input: StageInput, nsfw: bool) -> Result<String> {
        let prompt = self.build_prompt(&input, nsfw)?;

        tracing::info!(
            stage = %prompt.stage,
            client = client.client_type(),
            endpoint = client.endpoint(),
            "running stage"
        );

        let text = client.complete(&prompt.text, prompt.image).await?;

        if is_denial(&text) {
            tracing::warn!(stage = %prompt.stage, "model declined the request");
        }

        Ok(match prompt.stage {
            Stage::PromptFusion => truncate_chars(&text, FUSION_PROMPT_LIMIT),
            _ => text,
        })
    }

    /// Run one stage and render the outcome for display; never fails
    pub async fn run_display(&self, client: &dyn LlmClient, input: StageInput, nsfw: bool) -> String {
        render(self.run(client, input, nsfw).await)
    }
}

/// Render a stage outcome: the text itself, or `"Error: <detail>"`
pub fn render(outcome: Result<String>) -> String {
    match outcome {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "stage failed");
            format!("Error: {}", e)
        }
    }
}

/// Whether `text` is one of the stock refusals
pub fn is_denial(text: &str) -> bool {
    let text = text.trim();
    DENIAL_RESPONSES.iter().any(|d| text == *d)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
