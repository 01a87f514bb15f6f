//! Extraction worker: one chunk → one schema-validated payload.
//!
//! ## Request layout
//!
//! ```text
//! system: category prompt + universal guidelines + JSON schema contract
//! user:   preamble
//!         [REFERENCE ONLY - ALREADY PARSED] TEXT BLOCK: …      (overlap)
//!         [EXTRACT THIS] IMAGE BLOCK: attachment #1
//!         [EXTRACT THIS] TEXT BLOCK: …
//!         + attachments #1..#n
//! ```
//!
//! ## Retry Strategy
//!
//! Provider errors, timeouts and replies that do not decode into the
//! category payload are all retried. Rate limits and overloaded backends are
//! the common case under a five-wide fan-out, so the backoff starts at one
//! second and doubles (1 s → 2 s → 4 s …). Each attempt gets its own timeout;
//! nothing bounds the total wall-clock time of a chunk except the attempt
//! count.

use crate::category::Category;
use crate::error::{ExtractionError, ModelInvocationError};
use crate::gateway::{ModelGateway, ModelRequest};
use crate::payload::Payload;
use crate::pipeline::sanitize::clean_reply;
use crate::pipeline::segment::{Chunk, ContentBlock};
use crate::prompts::{image_block_heading, text_block_heading, CHUNK_PREAMBLE};
use crate::retry::{RetryPolicy, Sleeper};
use crate::schema::{schema_for, Shape};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// What every chunk of one document is extracted into.
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    pub category: Category,
    pub shape: &'static Shape,
    pub system_prompt: String,
}

impl ExtractionTarget {
    pub fn new(category: Category, system_prompt: impl Into<String>) -> Self {
        Self {
            category,
            shape: schema_for(category),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Build the model request for one chunk.
pub fn build_request(chunk: &Chunk, target: &ExtractionTarget) -> ModelRequest {
    let mut user_text = String::from(CHUNK_PREAMBLE);
    let mut images = Vec::new();
    for cb in &chunk.blocks {
        match cb.block.as_ref() {
            ContentBlock::Text(text) => {
                user_text.push_str(&text_block_heading(cb.reference_only));
                user_text.push_str(text);
            }
            ContentBlock::Image(img) => {
                images.push(img.clone());
                user_text.push_str(&image_block_heading(cb.reference_only, images.len()));
            }
        }
    }
    ModelRequest {
        system: target.system_prompt.clone(),
        user_text,
        images,
        shape: target.shape,
    }
}

/// Calls the model for a chunk, retrying with backoff.
#[derive(Clone)]
pub struct ExtractionWorker {
    gateway: Arc<dyn ModelGateway>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    api_timeout: Duration,
}

impl ExtractionWorker {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        api_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            retry,
            sleeper,
            api_timeout,
        }
    }

    /// Extract one chunk.
    ///
    /// Returns the decoded payload of the first successful attempt, or an
    /// [`ExtractionError`] carrying the last attempt's failure.
    pub async fn extract(
        &self,
        chunk: &Chunk,
        target: &ExtractionTarget,
    ) -> Result<Payload, ExtractionError> {
        let request = build_request(chunk, target);
        let start = Instant::now();
        let mut last_err = ModelInvocationError::Provider {
            message: "no attempt made".into(),
        };

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let backoff = self.retry.delay_for(attempt - 1);
                warn!(
                    chunk = chunk.index,
                    "retry {}/{} after {:?}: {}",
                    attempt,
                    self.retry.max_attempts - 1,
                    backoff,
                    last_err
                );
                self.sleeper.sleep(backoff).await;
            }

            match self.attempt(&request, target.category).await {
                Ok(payload) => {
                    debug!(
                        chunk = chunk.index,
                        items = payload.item_count(),
                        "extracted in {:?} ({} attempt(s))",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(payload);
                }
                Err(e) => last_err = e,
            }
        }

        error!(
            chunk = chunk.index,
            "giving up after {} attempt(s): {}", self.retry.max_attempts, last_err
        );
        Err(ExtractionError {
            chunk: chunk.index,
            attempts: self.retry.max_attempts,
            source: last_err,
        })
    }

    async fn attempt(
        &self,
        request: &ModelRequest,
        category: Category,
    ) -> Result<Payload, ModelInvocationError> {
        let reply = tokio::time::timeout(self.api_timeout, self.gateway.complete(request))
            .await
            .map_err(|_| ModelInvocationError::Timeout {
                secs: self.api_timeout.as_secs(),
            })??;
        let cleaned = clean_reply(&reply.content);
        Payload::decode_str(category, &cleaned).map_err(|e| ModelInvocationError::InvalidOutput {
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ModelReply;
    use crate::pipeline::segment::{chunk, ImagePayload};
    use crate::retry::RecordingSleeper;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of outcomes, then repeats the last one.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ModelInvocationError>>>,
        calls: Mutex<Vec<ModelRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, ModelInvocationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelGateway for Scripted {
        async fn complete(
            &self,
            request: &ModelRequest,
        ) -> Result<ModelReply, ModelInvocationError> {
            self.calls.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            let next = if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            };
            next.map(ModelReply::text)
        }
    }

    struct Hanging;

    #[async_trait]
    impl ModelGateway for Hanging {
        async fn complete(&self, _: &ModelRequest) -> Result<ModelReply, ModelInvocationError> {
            std::future::pending().await
        }
    }

    fn provider_err() -> ModelInvocationError {
        ModelInvocationError::Provider {
            message: "503 overloaded".into(),
        }
    }

    fn one_chunk() -> Chunk {
        let blocks = vec![Arc::new(ContentBlock::Text("Ohm's law: V = IR".into()))];
        chunk(&blocks, 5, 1).remove(0)
    }

    fn worker(gateway: Arc<dyn ModelGateway>, attempts: u32, sleeper: &RecordingSleeper) -> ExtractionWorker {
        ExtractionWorker::new(
            gateway,
            RetryPolicy::new(attempts, Duration::from_secs(1)),
            Arc::new(sleeper.clone()),
            Duration::from_secs(60),
        )
    }

    fn target() -> ExtractionTarget {
        ExtractionTarget::new(Category::FormulaSheet, "system")
    }

    const OHM: &str = r#"{"formulas":[{"name":"Ohm's Law","latex":"V=IR"}]}"#;

    #[test]
    fn request_labels_reference_and_extract_blocks() {
        let blocks = vec![
            Arc::new(ContentBlock::Text("first".into())),
            Arc::new(ContentBlock::Image(ImagePayload {
                data: "AAAA".into(),
                mime_type: "image/jpeg".into(),
            })),
            Arc::new(ContentBlock::Text("third".into())),
        ];
        let chunks = chunk(&blocks, 2, 1);
        let req = build_request(&chunks[1], &target());

        assert!(req.user_text.starts_with(CHUNK_PREAMBLE));
        assert!(req
            .user_text
            .contains("[REFERENCE ONLY - ALREADY PARSED] IMAGE BLOCK: attachment #1"));
        assert!(req.user_text.contains("[EXTRACT THIS] TEXT BLOCK:\nthird"));
        assert!(!req.user_text.contains("first"));
        assert_eq!(req.images.len(), 1);
        assert_eq!(req.system, "system");
        assert_eq!(req.shape.name, target().shape.name);
    }

    #[tokio::test]
    async fn first_attempt_success_does_not_sleep() {
        let gw = Scripted::new(vec![Ok(OHM)]);
        let sleeper = RecordingSleeper::new();
        let payload = worker(gw.clone(), 10, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap();
        assert_eq!(payload.item_count(), 1);
        assert_eq!(gw.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn retries_with_doubling_backoff_then_succeeds() {
        let gw = Scripted::new(vec![Err(provider_err()), Err(provider_err()), Ok(OHM)]);
        let sleeper = RecordingSleeper::new();
        let payload = worker(gw.clone(), 10, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap();
        assert_eq!(payload.item_count(), 1);
        assert_eq!(gw.calls(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn exhausting_attempts_returns_last_error() {
        let gw = Scripted::new(vec![Err(provider_err())]);
        let sleeper = RecordingSleeper::new();
        let err = worker(gw.clone(), 3, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap_err();
        assert_eq!(err.chunk, 0);
        assert_eq!(err.attempts, 3);
        assert!(matches!(err.source, ModelInvocationError::Provider { .. }));
        assert_eq!(gw.calls(), 3);
        // No sleep after the final attempt.
        assert_eq!(sleeper.delays().len(), 2);
    }

    #[tokio::test]
    async fn invalid_output_is_retried() {
        let gw = Scripted::new(vec![Ok("I could not read the page."), Ok(OHM)]);
        let sleeper = RecordingSleeper::new();
        let payload = worker(gw.clone(), 3, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap();
        assert_eq!(payload.item_count(), 1);
        assert_eq!(gw.calls(), 2);
    }

    #[tokio::test]
    async fn fenced_reply_is_accepted() {
        let fenced = format!("```json\n{OHM}\n```");
        let gw = Scripted::new(vec![Ok(fenced.as_str())]);
        let sleeper = RecordingSleeper::new();
        let payload = worker(gw, 1, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap();
        assert_eq!(payload.item_count(), 1);
    }

    #[tokio::test]
    async fn solved_paper_without_answer_is_invalid() {
        let gw = Scripted::new(vec![Ok(
            r#"{"questions":[{"marks":7,"question_text":"Define flux.","has_or_choice":false}]}"#,
        )]);
        let sleeper = RecordingSleeper::new();
        let err = worker(gw, 1, &sleeper)
            .extract(
                &one_chunk(),
                &ExtractionTarget::new(Category::SolvedPaper, "system"),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.source,
            ModelInvocationError::InvalidOutput { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let sleeper = RecordingSleeper::new();
        let err = worker(Arc::new(Hanging), 2, &sleeper)
            .extract(&one_chunk(), &target())
            .await
            .unwrap_err();
        assert!(matches!(
            err.source,
            ModelInvocationError::Timeout { secs: 60 }
        ));
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(1)]);
    }
}
