//! Credential Source and Retry Wrapper
//!
//! API keys are never stored on provider adapters; a [`KeySource`] hands
//! one out per call. [`KeyRing`] is the standard rotating source: keys
//! invalidated after authentication failures are skipped, and when every
//! key is dead the source reports exhaustion. [`call_with_retry`] wraps a
//! provider call with key rotation and exponential backoff for retryable
//! failures.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::types::{LlmError, LlmResult};

/// Source of API keys and the active model, consulted once per call.
pub trait KeySource: Send + Sync {
    /// Next usable key, or `None` when all keys are exhausted.
    fn next_api_key(&self) -> Option<String>;

    /// The model the caller should target right now.
    fn current_model(&self) -> String;

    /// Mark a key as dead after the provider rejected it.
    fn invalidate(&self, _key: &str) {}
}

/// Rotating key ring with dead-key tracking.
pub struct KeyRing {
    keys: Vec<String>,
    model: String,
    cursor: AtomicUsize,
    dead: Mutex<HashSet<String>>,
}

impl KeyRing {
    pub fn new(keys: Vec<String>, model: impl Into<String>) -> Self {
        Self {
            keys,
            model: model.into(),
            cursor: AtomicUsize::new(0),
            dead: Mutex::new(HashSet::new()),
        }
    }

    /// Ring over a single key.
    pub fn single(key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(vec![key.into()], model)
    }

    /// Number of keys not yet invalidated.
    pub fn live_keys(&self) -> usize {
        let dead = self.dead.lock().expect("key ring lock poisoned");
        self.keys.iter().filter(|k| !dead.contains(*k)).count()
    }
}

impl KeySource for KeyRing {
    fn current_model(&self) -> String {
        self.model.clone()
    }

    fn next_api_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }
        let dead = self.dead.lock().expect("key ring lock poisoned");
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.keys.len() {
            let key = &self.keys[(start + offset) % self.keys.len()];
            if !dead.contains(key) {
                return Some(key.clone());
            }
        }
        None
    }

    fn invalidate(&self, key: &str) {
        let mut dead = self.dead.lock().expect("key ring lock poisoned");
        if dead.insert(key.to_string()) {
            warn!(
                live = self.keys.len() - dead.len(),
                "API key invalidated after rejection"
            );
        }
    }
}

/// Base delay for exponential backoff
const BACKOFF_BASE_SECS: u64 = 1;
/// Ceiling for a single backoff sleep
const BACKOFF_CAP_SECS: u64 = 30;

fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    let secs = retry_after
        .unwrap_or_else(|| BACKOFF_BASE_SECS.saturating_mul(1 << attempt.min(8)))
        .min(BACKOFF_CAP_SECS);
    Duration::from_secs(secs)
}

/// Run a provider call with key rotation and backoff.
///
/// Each attempt draws a fresh key from the source. Authentication
/// failures invalidate the key and rotate immediately; retryable errors
/// (network, rate limit, server) back off exponentially; everything else
/// returns at once. When the source runs dry the result is
/// [`LlmError::KeysExhausted`].
pub async fn call_with_retry<T, F, Fut>(
    source: &dyn KeySource,
    max_attempts: u32,
    mut call: F,
) -> LlmResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = LlmResult<T>>,
{
    let mut last_error = LlmError::KeysExhausted;

    for attempt in 0..max_attempts {
        let key = match source.next_api_key() {
            Some(key) => key,
            None => return Err(LlmError::KeysExhausted),
        };

        match call(key.clone()).await {
            Ok(value) => return Ok(value),
            Err(LlmError::AuthenticationFailed { message }) => {
                source.invalidate(&key);
                last_error = LlmError::AuthenticationFailed { message };
            }
            Err(error) if error.is_retryable() && attempt + 1 < max_attempts => {
                let retry_after = match &error {
                    LlmError::RateLimited { retry_after, .. } => *retry_after,
                    _ => None,
                };
                let delay = backoff_delay(attempt, retry_after);
                debug!(attempt, delay_secs = delay.as_secs(), error = %error, "retrying provider call");
                tokio::time::sleep(delay).await;
                last_error = error;
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_key_ring_rotates() {
        let ring = KeyRing::new(vec!["a".into(), "b".into()], "model-x");
        let first = ring.next_api_key().unwrap();
        let second = ring.next_api_key().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalidated_keys_are_skipped() {
        let ring = KeyRing::new(vec!["a".into(), "b".into()], "model-x");
        ring.invalidate("a");
        assert_eq!(ring.live_keys(), 1);
        for _ in 0..4 {
            assert_eq!(ring.next_api_key().as_deref(), Some("b"));
        }
        ring.invalidate("b");
        assert!(ring.next_api_key().is_none());
    }

    #[test]
    fn test_empty_ring_is_exhausted() {
        let ring = KeyRing::new(vec![], "model-x");
        assert!(ring.next_api_key().is_none());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let ring = KeyRing::single("k", "model-x");
        let attempts = AtomicU32::new(0);
        let result = call_with_retry(&ring, 3, |_key| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(LlmError::network("connection reset"))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_rotates_to_next_key() {
        let ring = KeyRing::new(vec!["bad".into(), "good".into()], "model-x");
        let result = call_with_retry(&ring, 4, |key| async move {
            if key == "bad" {
                Err(LlmError::AuthenticationFailed {
                    message: "rejected".into(),
                })
            } else {
                Ok(key)
            }
        })
        .await;
        assert_eq!(result.unwrap(), "good");
        assert_eq!(ring.live_keys(), 1);
    }

    #[tokio::test]
    async fn test_all_keys_dead_reports_exhausted() {
        let ring = KeyRing::new(vec!["a".into(), "b".into()], "model-x");
        let result: LlmResult<()> = call_with_retry(&ring, 5, |_key| async {
            Err(LlmError::AuthenticationFailed {
                message: "rejected".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(LlmError::KeysExhausted)));
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let ring = KeyRing::single("k", "model-x");
        let attempts = AtomicU32::new(0);
        let result: LlmResult<()> = call_with_retry(&ring, 3, |_key| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::parse("bad json")) }
        })
        .await;
        assert!(matches!(result, Err(LlmError::ParseError { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delay_respects_retry_after_and_cap() {
        assert_eq!(backoff_delay(0, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, None), Duration::from_secs(4));
        assert_eq!(backoff_delay(0, Some(7)), Duration::from_secs(7));
        assert_eq!(backoff_delay(9, None), Duration::from_secs(30));
    }
}
