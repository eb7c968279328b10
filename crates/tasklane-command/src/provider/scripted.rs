//! Provider that replays canned replies.
//!
//! Used by tests, benchmarks and offline runs of the binary. Replies are
//! consumed in order; the last one repeats once the queue is down to it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionProvider, Prompt};
use crate::error::ProviderError;

pub struct ScriptedProvider {
    name: String,
    timeout: Duration,
    delay: Option<Duration>,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<Prompt>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(5),
            delay: None,
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()))
    }

    /// Queue a failure.
    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Err(error))
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn push(self, reply: Result<String, ProviderError>) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    /// Number of `complete` calls received, including timed-out ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        next.unwrap_or_else(|| {
            Err(ProviderError::Protocol {
                provider: self.name.clone(),
                message: "no scripted reply".to_string(),
            })
        })
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .last_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(prompt.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_then_repeat_last() {
        let provider = ScriptedProvider::new("s").reply("uno").reply("dos");
        let prompt = Prompt::new("sys", "user");
        assert_eq!(provider.complete(&prompt).await.unwrap(), "uno");
        assert_eq!(provider.complete(&prompt).await.unwrap(), "dos");
        assert_eq!(provider.complete(&prompt).await.unwrap(), "dos");
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.last_prompt().unwrap().user, "user");
    }

    #[tokio::test]
    async fn test_empty_script_is_protocol_error() {
        let provider = ScriptedProvider::new("s");
        let err = provider
            .complete(&Prompt::new("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Protocol { .. }));
    }
}
