//! Configuration for the extraction pipeline and the job queue.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. One struct is shared by the segmenter, the
//! coordinator, the extraction worker and the job queue, so two runs can be
//! compared by diffing their configs.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on the documented defaults
//! for the rest. Setters clamp obviously invalid values; [`build`] rejects
//! combinations that cannot work.
//!
//! [`build`]: PipelineConfigBuilder::build

use crate::error::PipelineError;
use crate::progress::ParseProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for parsing documents.
///
/// # Example
/// ```rust
/// use exam_extract::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_size(4)
///     .concurrency(3)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.overlap_size, 1);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Content blocks a chunk is responsible for extracting. Default: 5.
    ///
    /// Five pages of a scanned paper fit comfortably in one vision request
    /// while keeping the reply well under `max_tokens`.
    pub chunk_size: usize,

    /// Trailing blocks of the previous chunk repeated as reference-only
    /// context. Default: 1.
    ///
    /// May reach or exceed `chunk_size`; the window then starts further back,
    /// never before the first block.
    pub overlap_size: usize,

    /// Maximum characters per text block when slicing pasted text. Default: 5000.
    pub max_text_block_chars: usize,

    /// Simultaneous model calls. Default: 5.
    ///
    /// The gate is a semaphore shared by every document parsed through the
    /// same [`crate::Pipeline`], so it bounds provider load process-wide.
    pub concurrency: usize,

    /// Attempts per chunk, including the first. Default: 10.
    pub max_attempts: u32,

    /// Backoff after the first failed attempt, doubled per attempt. Default: 1000 ms.
    pub retry_base_delay_ms: u64,

    /// Upper bound on a single backoff delay. Default: none.
    pub retry_max_delay_ms: Option<u64>,

    /// Per-attempt model call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Low enough to transcribe faithfully, high enough that a retry after an
    /// invalid reply does not reproduce the same reply.
    pub temperature: f32,

    /// Output token budget per chunk. Default: 8192.
    ///
    /// Solved papers carry worked answers; five pages of them routinely pass
    /// 4 000 tokens.
    pub max_tokens: usize,

    /// Rasterisation scale factor for PDF pages. Default: 2.0.
    pub pdf_render_scale: f32,

    /// Timeout for `http(s)://` blob downloads in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// LLM model identifier, e.g. "gpt-4.1-mini", "gemini-2.5-flash".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "anthropic").
    /// If None along with `provider`, the environment decides.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Progress events for each parse. Default: none.
    pub progress_callback: Option<Arc<dyn ParseProgressCallback>>,

    /// Times the job queue re-runs a failed document. Default: 3.
    pub job_max_retries: u32,

    /// Base delay before re-running a failed document, doubled per retry.
    /// Default: 60 s.
    pub job_retry_base_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            overlap_size: 1,
            max_text_block_chars: 5000,
            concurrency: 5,
            max_attempts: 10,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: None,
            api_timeout_secs: 60,
            temperature: 0.2,
            max_tokens: 8192,
            pdf_render_scale: 2.0,
            download_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            progress_callback: None,
            job_max_retries: 3,
            job_retry_base_secs: 60,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("chunk_size", &self.chunk_size)
            .field("overlap_size", &self.overlap_size)
            .field("max_text_block_chars", &self.max_text_block_chars)
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("pdf_render_scale", &self.pdf_render_scale)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ParseProgressCallback>"),
            )
            .field("job_max_retries", &self.job_max_retries)
            .field("job_retry_base_secs", &self.job_retry_base_secs)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Backoff policy for a single chunk.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        );
        match self.retry_max_delay_ms {
            Some(cap) => policy.with_max_delay(Duration::from_millis(cap)),
            None => policy,
        }
    }

    /// Backoff policy for whole-document re-runs.
    pub fn job_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.job_max_retries + 1,
            Duration::from_secs(self.job_retry_base_secs),
        )
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl PipelineConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n.max(1);
        self
    }

    pub fn overlap_size(mut self, n: usize) -> Self {
        self.config.overlap_size = n;
        self
    }

    pub fn max_text_block_chars(mut self, n: usize) -> Self {
        self.config.max_text_block_chars = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    pub fn retry_max_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_max_delay_ms = Some(ms);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn pdf_render_scale(mut self, scale: f32) -> Self {
        self.config.pdf_render_scale = scale.clamp(0.5, 4.0);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn ParseProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn job_max_retries(mut self, n: u32) -> Self {
        self.config.job_max_retries = n;
        self
    }

    pub fn job_retry_base_secs(mut self, secs: u64) -> Self {
        self.config.job_retry_base_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if let Some(cap) = c.retry_max_delay_ms {
            if cap < c.retry_base_delay_ms {
                return Err(PipelineError::InvalidConfig(format!(
                    "retry_max_delay_ms ({cap}) is below retry_base_delay_ms ({})",
                    c.retry_base_delay_ms
                )));
            }
        }
        Ok(self.config)
    }
}
