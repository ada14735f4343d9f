// Provider chain orchestrator
//
// Strategy:
// 1. Providers are tried strictly in list order, never concurrently
// 2. First success wins, later providers are never consulted
// 3. Every failure is classified at the provider boundary
// 4. A non-retryable classification stops the chain immediately
// 5. When the chain is exhausted, the last attempt's classification wins

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use super::diagnostics::ErrorClassifier;
use super::errors::{ClassifiedError, ErrorCategory, ProviderError};
use super::models::{AttemptOutcome, AudioSource, Operation, ProviderAttempt, VideoMetadata};
use super::reference::VideoReference;
use super::traits::ExtractionProvider;

/// Outcome of one chain resolution plus the ordered attempt log
#[derive(Debug)]
pub struct Resolution<T> {
    pub outcome: Result<T, ClassifiedError>,
    pub attempts: Vec<ProviderAttempt>,
}

impl<T> Resolution<T> {
    pub fn into_result(self) -> Result<T, ClassifiedError> {
        self.outcome
    }

    /// Names of the providers that were actually invoked, in order
    pub fn attempted(&self) -> Vec<&'static str> {
        self.attempts.iter().map(|a| a.provider).collect()
    }
}

enum Resolved {
    Metadata(VideoMetadata),
    Audio(AudioSource),
}

/// Ordered list of providers with a shared classifier and attempt bound
pub struct ProviderChain {
    providers: Vec<Arc<dyn ExtractionProvider>>,
    classifier: ErrorClassifier,
    attempt_timeout: Duration,
}

impl ProviderChain {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            classifier: ErrorClassifier::new(),
            attempt_timeout,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ExtractionProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn ExtractionProvider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Arc<dyn ExtractionProvider>] {
        &self.providers
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn resolve_metadata(&self, reference: &VideoReference) -> Resolution<VideoMetadata> {
        let resolution = self.resolve(reference, Operation::Metadata).await;
        Resolution {
            outcome: resolution.outcome.and_then(|resolved| match resolved {
                Resolved::Metadata(metadata) => Ok(metadata),
                Resolved::Audio(_) => Err(mismatched(Operation::Metadata)),
            }),
            attempts: resolution.attempts,
        }
    }

    pub async fn resolve_audio(&self, reference: &VideoReference) -> Resolution<AudioSource> {
        let resolution = self.resolve(reference, Operation::Audio).await;
        Resolution {
            outcome: resolution.outcome.and_then(|resolved| match resolved {
                Resolved::Audio(source) => Ok(source),
                Resolved::Metadata(_) => Err(mismatched(Operation::Audio)),
            }),
            attempts: resolution.attempts,
        }
    }

    async fn invoke(
        provider: &dyn ExtractionProvider,
        reference: &VideoReference,
        operation: Operation,
    ) -> Result<Resolved, ProviderError> {
        match operation {
            Operation::Metadata => provider.fetch_metadata(reference).await.map(Resolved::Metadata),
            Operation::Audio => provider.fetch_audio(reference).await.map(Resolved::Audio),
        }
    }

    async fn resolve(&self, reference: &VideoReference, operation: Operation) -> Resolution<Resolved> {
        let mut attempts: Vec<ProviderAttempt> = Vec::new();
        let mut last: Option<ClassifiedError> = None;

        for provider in &self.providers {
            let name = provider.name();

            if !provider.supports(operation) {
                tracing::debug!(provider = name, %operation, "provider does not offer operation, skipping");
                continue;
            }

            if let Some(gate) = provider.gated_on() {
                let opened = attempts.iter().any(|a| a.category() == Some(gate));
                if !opened {
                    tracing::debug!(provider = name, %operation, gate = %gate, "gate not opened, skipping");
                    continue;
                }
            }

            if !provider.is_available().await {
                tracing::info!(provider = name, %operation, "provider unavailable, skipping");
                continue;
            }

            tracing::info!(provider = name, kind = %provider.kind(), %operation, url = %reference, "attempting provider");
            let started = Instant::now();

            let result = match timeout(
                self.attempt_timeout,
                Self::invoke(provider.as_ref(), reference, operation),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.attempt_timeout.as_secs())),
            };

            match result {
                Ok(resolved) => {
                    tracing::info!(
                        provider = name,
                        %operation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "provider succeeded"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name,
                        operation,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Resolution {
                        outcome: Ok(resolved),
                        attempts,
                    };
                }
                Err(raw) => {
                    let classified = self.classifier.classify(&raw, provider.kind());
                    tracing::warn!(
                        provider = name,
                        %operation,
                        category = %classified.category,
                        retryable = classified.retryable,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %raw,
                        "provider failed"
                    );
                    attempts.push(ProviderAttempt {
                        provider: name,
                        operation,
                        outcome: AttemptOutcome::Failed(classified.clone()),
                    });

                    if !classified.retryable {
                        return Resolution {
                            outcome: Err(classified),
                            attempts,
                        };
                    }
                    last = Some(classified);
                }
            }
        }

        let all_format_changed = !attempts.is_empty()
            && attempts
                .iter()
                .all(|a| a.category() == Some(ErrorCategory::UpstreamFormatChanged));

        let err = match last {
            None => ClassifiedError::provider_unavailable(format!("no provider available for {}", operation)),
            Some(_) if all_format_changed => ClassifiedError::provider_unavailable(format!(
                "every provider failed to parse the upstream {} response",
                operation
            )),
            Some(err) => err,
        };

        tracing::warn!(
            %operation,
            attempts = attempts.len(),
            category = %err.category,
            "provider chain exhausted"
        );

        Resolution {
            outcome: Err(err),
            attempts,
        }
    }
}

fn mismatched(operation: Operation) -> ClassifiedError {
    ClassifiedError::new(
        ErrorCategory::ExtractionFailed,
        format!("provider returned the wrong payload for {}", operation),
    )
}
