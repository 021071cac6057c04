//! External classifier adapter
//!
//! Sends a batch of label names together with the taxonomy to a
//! [`CompletionBackend`], then parses, validates and normalizes the reply into
//! one [`ClassificationResult`] per input label, in input order.
//!
//! # Failure handling
//! - Transport and parse failures are retried with exponential backoff
//! - When retries run out, every label in the batch gets a failed result
//! - A label whose category cannot be normalized fails on its own; the rest
//!   of the batch is unaffected

pub mod client;
pub mod prompt;
pub mod response;
pub mod retry;

pub use client::{ChatCompletionClient, CompletionBackend};
pub use response::AliasTable;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::error::ClassifierError;
use pstag_common::{MainCategory, Taxonomy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome for one label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub name: String,
    pub main_category: Option<MainCategory>,
    pub sub_category: Option<String>,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl ClassificationResult {
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            main_category: None,
            sub_category: None,
            confidence: 0.0,
            reasoning: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Results of one batch call plus the number of requests it took
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub results: Vec<ClassificationResult>,
    pub attempts: u32,
    /// Every attempt failed; all results are failures
    pub exhausted: bool,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Batched classification through an external text-completion capability
pub struct ExternalClassifier {
    backend: Arc<dyn CompletionBackend>,
    taxonomy: Taxonomy,
    aliases: AliasTable,
    retry: RetryPolicy,
    confidence_floor: f64,
    sleeper: Arc<dyn Sleeper>,
}

impl ExternalClassifier {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        taxonomy: Taxonomy,
        aliases: AliasTable,
        retry: RetryPolicy,
        confidence_floor: f64,
    ) -> Self {
        Self {
            backend,
            taxonomy,
            aliases,
            retry,
            confidence_floor,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the delay mechanism used between retries
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Classify a batch with the configured retry policy
    pub async fn classify_batch(&self, labels: &[String]) -> Vec<ClassificationResult> {
        self.classify_batch_with(labels, &self.retry).await.results
    }

    /// Classify a batch with an explicit retry policy
    pub async fn classify_batch_with(&self, labels: &[String], policy: &RetryPolicy) -> BatchOutcome {
        if labels.is_empty() {
            return BatchOutcome {
                results: Vec::new(),
                attempts: 0,
                exhausted: false,
            };
        }

        let prompt = prompt::build_prompt(&self.taxonomy, labels);
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = String::new();
        let mut attempts = 0;

        while attempts < max_attempts {
            attempts += 1;
            debug!(
                attempt = attempts,
                max_attempts,
                labels = labels.len(),
                "Requesting external classification"
            );

            let error = match self.request(&prompt).await {
                Ok(items) => {
                    let results = self.build_results(labels, items);
                    let succeeded = results.iter().filter(|r| r.success).count();
                    info!(
                        attempt = attempts,
                        labels = labels.len(),
                        succeeded,
                        "External classification batch complete"
                    );
                    return BatchOutcome {
                        results,
                        attempts,
                        exhausted: false,
                    };
                }
                Err(e) => e,
            };

            last_error = error.to_string();
            let retryable = error.is_retryable();
            warn!(
                attempt = attempts,
                max_attempts,
                labels = labels.len(),
                retryable,
                error = %error,
                "External classification attempt failed"
            );
            if !retryable {
                break;
            }

            if attempts < max_attempts {
                let delay = policy.backoff_with_jitter(attempts, &mut rand::thread_rng());
                debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                self.sleeper.sleep(delay).await;
            }
        }

        let exhausted = ClassifierError::RetriesExhausted {
            attempts,
            last_error,
        };
        error!(
            attempts,
            labels = labels.len(),
            error = %exhausted,
            "External classification batch failed"
        );
        let message = exhausted.to_string();
        BatchOutcome {
            results: labels
                .iter()
                .map(|name| ClassificationResult::failed(name.clone(), message.clone()))
                .collect(),
            attempts,
            exhausted: true,
        }
    }

    async fn request(&self, prompt: &str) -> Result<Vec<response::RawClassification>, ClassifierError> {
        let raw = self.backend.complete(prompt).await?;
        let items = response::parse_response(&raw)?;
        if items.is_empty() {
            return Err(ClassifierError::Parse(
                "response contained no classifications".to_string(),
            ));
        }
        Ok(items)
    }

    /// Pair parsed entries with the requested labels, one result per label
    fn build_results(
        &self,
        labels: &[String],
        items: Vec<response::RawClassification>,
    ) -> Vec<ClassificationResult> {
        let mut exact: HashMap<String, usize> = HashMap::new();
        let mut loose: HashMap<String, usize> = HashMap::new();
        for (index, item) in items.iter().enumerate() {
            exact.entry(item.tag.clone()).or_insert(index);
            loose.entry(loose_key(&item.tag)).or_insert(index);
        }

        labels
            .iter()
            .map(|label| {
                let index = exact
                    .get(label)
                    .or_else(|| loose.get(&loose_key(label)))
                    .copied();
                match index {
                    Some(index) => self.normalize(label, &items[index]),
                    None => {
                        warn!(label = %label, "Label missing from external response");
                        ClassificationResult::failed(label.clone(), "label missing from response")
                    }
                }
            })
            .collect()
    }

    fn normalize(&self, label: &str, item: &response::RawClassification) -> ClassificationResult {
        let confidence = response::parse_confidence(item.confidence.as_ref(), self.confidence_floor);
        let reasoning = response::value_as_text(item.reasoning.as_ref());
        let raw_main = response::value_as_text(item.main_category.as_ref()).unwrap_or_default();

        let Some((main, implied_sub)) = response::normalize_main(&raw_main, &self.aliases) else {
            warn!(label = %label, main_category = %raw_main, "Unrecognized main category");
            return ClassificationResult {
                name: label.to_string(),
                main_category: None,
                sub_category: None,
                confidence,
                reasoning,
                success: false,
                error: Some(format!("unrecognized main category '{}'", raw_main)),
            };
        };

        let raw_sub = response::value_as_text(item.sub_category.as_ref());
        let sub_category = match raw_sub.as_deref() {
            Some(raw) if !pstag_common::db::is_sentinel(raw) => {
                let sub = response::normalize_sub(main, raw, &self.taxonomy);
                if sub.is_none() {
                    debug!(label = %label, main = %main, sub_category = %raw, "Dropping subcategory not allowed under main");
                }
                sub
            }
            _ => implied_sub
                .filter(|sub| self.taxonomy.allows_sub(main, sub))
                .map(str::to_string),
        };

        ClassificationResult {
            name: label.to_string(),
            main_category: Some(main),
            sub_category,
            confidence,
            reasoning,
            success: true,
            error: None,
        }
    }
}

fn loose_key(tag: &str) -> String {
    tag.trim().to_lowercase().replace(' ', "_")
}
