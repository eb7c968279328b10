//! Ordered fallback over completion providers.

use std::sync::Arc;

use tasklane_core::config::ProvidersConfig;
use tracing::{info, warn};

use super::{CompletionProvider, HttpProvider, Prompt};
use crate::error::{ChainError, ProviderError};
use crate::telemetry::Telemetry;

/// A successful completion and how it was obtained.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Provider that produced `text`.
    pub provider: String,
    /// Failures of the providers tried before it.
    pub attempts: Vec<ProviderError>,
}

impl Completion {
    pub fn used_fallback(&self) -> bool {
        !self.attempts.is_empty()
    }
}

/// Tries each provider once, in order, until one answers.
///
/// Every attempt is raced against the provider's timeout. A timed-out call
/// is dropped and its eventual answer discarded. Content rejections stop
/// the chain immediately; any other failure moves on to the next provider.
pub struct ProviderChain {
    providers: Vec<Arc<dyn CompletionProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>) -> Self {
        Self { providers }
    }

    /// Primary first, then the secondary when configured.
    pub fn from_config(config: &ProvidersConfig) -> Self {
        let mut providers: Vec<Arc<dyn CompletionProvider>> =
            vec![Arc::new(HttpProvider::from_config(&config.primary))];
        if let Some(secondary) = &config.secondary {
            providers.push(Arc::new(HttpProvider::from_config(secondary)));
        }
        Self::new(providers)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn complete(
        &self,
        prompt: &Prompt,
        telemetry: &Telemetry,
    ) -> Result<Completion, ChainError> {
        if self.providers.is_empty() {
            return Err(ChainError::NoProviders);
        }

        let mut attempts = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            let name = provider.name().to_string();
            let limit = provider.timeout();
            telemetry.record_provider_request(&name);

            let result = match tokio::time::timeout(limit, provider.complete(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: name.clone(),
                    after_ms: limit.as_millis() as u64,
                }),
            };

            let err = match result {
                Ok(text) => {
                    if index > 0 {
                        info!(provider = %name, attempts = attempts.len(), "Fallback provider answered");
                    }
                    return Ok(Completion {
                        text,
                        provider: name,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            let Some(reason) = err.fallback_reason() else {
                warn!(provider = %name, error = %err, "Provider rejected the command content");
                telemetry.record_content_rejection();
                return Err(ChainError::Rejected(err));
            };

            if let Some(next) = self.providers.get(index + 1) {
                warn!(
                    provider = %name,
                    next = %next.name(),
                    reason = %reason,
                    error = %err,
                    "Provider failed, falling back"
                );
                telemetry.record_fallback(reason);
            } else {
                warn!(provider = %name, reason = %reason, error = %err, "Last provider failed");
            }
            attempts.push(err);
        }

        telemetry.record_provider_failure();
        Err(ChainError::AllFailed { attempts })
    }
}
