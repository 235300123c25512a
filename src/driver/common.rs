//! Polling and text helpers shared by the browser driver and the engine

use std::future::Future;
use std::time::{Duration, Instant};

// ============================================================================
// Polling Utilities
// ============================================================================

/// Configuration for polling operations
#[derive(Clone, Debug)]
pub struct PollConfig {
    pub timeout_ms: u64,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub use_exponential_backoff: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15000,
            initial_interval_ms: 100,
            max_interval_ms: 500,
            use_exponential_backoff: true,
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            ..Default::default()
        }
    }
}

/// Generic polling function with optional exponential backoff
///
/// Calls `check_fn` repeatedly until it returns `true` or timeout is reached.
/// The check always runs at least once, even with a zero timeout.
/// Returns `true` if condition was met, `false` if timed out.
pub async fn wait_until<F, Fut>(check_fn: F, config: PollConfig) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut interval = config.initial_interval_ms.max(1);

    loop {
        if check_fn().await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }

        tokio::time::sleep(Duration::from_millis(interval)).await;

        if config.use_exponential_backoff {
            interval = (interval * 3 / 2).min(config.max_interval_ms.max(1));
        }
    }
}

// ============================================================================
// Text Utilities
// ============================================================================

/// Collapse whitespace runs to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escape a value for use inside a double-quoted CSS attribute selector.
pub fn escape_css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_wait_until_succeeds_after_retries() {
        let calls = AtomicUsize::new(0);
        let ok = wait_until(
            || async {
                calls.fetch_add(1, Ordering::SeqCst) >= 2
            },
            PollConfig {
                timeout_ms: 2000,
                initial_interval_ms: 1,
                max_interval_ms: 5,
                use_exponential_backoff: true,
            },
        )
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_checks_once_with_zero_timeout() {
        let calls = AtomicUsize::new(0);
        let ok = wait_until(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            },
            PollConfig::with_timeout(0),
        )
        .await;
        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(normalize_whitespace("  About \n  Us\t"), "About Us");
        assert_eq!(escape_css_string(r#"say "hi""#), r#"say \"hi\""#);
    }
}
