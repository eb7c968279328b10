//! Text-completion backends and the ordered fallback chain over them.
//!
//! Defines the `CompletionProvider` async trait. `HttpProvider` talks to
//! hosted models; `ScriptedProvider` replays canned replies for tests and
//! offline runs.

pub mod chain;
pub mod http;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;

pub use chain::{Completion, ProviderChain};
pub use http::{ApiFormat, HttpProvider};
pub use scripted::ScriptedProvider;

/// A system/user message pair sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// One interchangeable completion backend.
///
/// Implementations make exactly one attempt per call. The chain enforces
/// `timeout()` around `complete`, so implementations need not.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Name used in logs and telemetry.
    fn name(&self) -> &str;

    /// Upper bound on a single `complete` call.
    fn timeout(&self) -> Duration;

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}
