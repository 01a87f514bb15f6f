//! Model gateway: the single chat-completion seam of the pipeline.
//!
//! The extraction worker only ever needs "send a system instruction, a user
//! turn of text and images, get text back". [`ModelGateway`] captures exactly
//! that, so tests can script replies without a network and the host can put
//! middleware (caching, rate limiting) in front of the real provider.
//!
//! [`EdgequakeGateway`] is the production implementation over any
//! `edgequake_llm` vision provider. [`resolve_gateway`] picks the provider
//! from config and environment.

use crate::config::PipelineConfig;
use crate::error::{ModelInvocationError, PipelineError};
use crate::pipeline::segment::ImagePayload;
use crate::schema::Shape;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// One chat request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    /// The user turn; images are referenced in it by attachment number.
    pub user_text: String,
    /// Attached in order, numbered from 1.
    pub images: Vec<ImagePayload>,
    /// Shape the reply must match.
    pub shape: &'static Shape,
}

/// Raw reply text plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelInvocationError>;
}

/// [`ModelGateway`] over an `edgequake_llm` provider.
pub struct EdgequakeGateway {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl EdgequakeGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                ..Default::default()
            },
        }
    }

    /// Message layout: one system message, then one user message carrying
    /// the chunk text with the images attached.
    fn messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let images: Vec<ImageData> = request
            .images
            .iter()
            .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high"))
            .collect();
        vec![
            ChatMessage::system(request.system.clone()),
            ChatMessage::user_with_images(request.user_text.clone(), images),
        ]
    }
}

#[async_trait]
impl ModelGateway for EdgequakeGateway {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelInvocationError> {
        let messages = Self::messages(request);
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ModelInvocationError::Provider {
                message: e.to_string(),
            })?;
        debug!(
            shape = request.shape.name,
            "{} input tokens, {} output tokens", response.prompt_tokens, response.completion_tokens
        );
        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as is.
/// 2. **Named provider + model** (`config.provider_name`), API key from the
///    provider's usual environment variable.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, both set.
/// 4. **`OPENAI_API_KEY`** present → OpenAI.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, GEMINI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

/// Production gateway for `config`.
pub fn resolve_gateway(config: &PipelineConfig) -> Result<Arc<dyn ModelGateway>, PipelineError> {
    let provider = resolve_provider(config)?;
    Ok(Arc::new(EdgequakeGateway::new(
        provider,
        config.temperature,
        config.max_tokens,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::schema::schema_for;

    fn request(images: usize) -> ModelRequest {
        ModelRequest {
            system: "sys".into(),
            user_text: "user".into(),
            images: (0..images)
                .map(|_| ImagePayload {
                    data: "AAAA".into(),
                    mime_type: "image/jpeg".into(),
                })
                .collect(),
            shape: schema_for(Category::FormulaSheet),
        }
    }

    #[test]
    fn messages_are_system_then_user() {
        assert_eq!(EdgequakeGateway::messages(&request(0)).len(), 2);
        assert_eq!(EdgequakeGateway::messages(&request(3)).len(), 2);
    }

    #[test]
    fn provider_not_configured_is_not_retryable() {
        let err = PipelineError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "OPENAI_API_KEY is not set".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn reply_text_constructor() {
        let r = ModelReply::text("{}");
        assert_eq!(r.content, "{}");
        assert_eq!(r.input_tokens, 0);
    }
}
