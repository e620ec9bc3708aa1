//! Retry policy: transient/fatal classification and backoff.

use std::time::Duration;

/// How an error should be treated by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth a fresh model call after a backoff sleep
    Transient,
    /// Terminates the exchange
    Fatal,
}

/// Retry configuration for transient model-stream failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts per model call
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the computed delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay for a given attempt (0-indexed), increasing linearly.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.saturating_mul(attempt + 1);
        delay.min(self.max_delay)
    }

    /// Classify an error message as transient or fatal.
    pub fn classify(&self, error: &str) -> ErrorClass {
        if is_transient_error(error) {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }
}

/// String-pattern fallback for errors that lost their type on the way up.
pub fn is_transient_error(error: &str) -> bool {
    // Rate limit errors
    if error.contains("429") || error.contains("rate limit") || error.contains("Rate limit") {
        return true;
    }
    // Transient network errors
    if error.contains("timeout") || error.contains("Timeout") {
        return true;
    }
    if error.contains("connection") || error.contains("Connection") {
        return true;
    }
    // Server errors (5xx)
    if error.contains("500")
        || error.contains("502")
        || error.contains("503")
        || error.contains("504")
    {
        return true;
    }
    // Overloaded
    if error.contains("overloaded") || error.contains("Overloaded") {
        return true;
    }
    false
}

/// Retry bookkeeping scoped to a single model call.
///
/// Reset at the start of every call; discarded on success or once attempts
/// exceed the policy ceiling.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Number of failed attempts so far
    pub attempt: u32,
    /// Most recent error message
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt
    pub fn record(&mut self, error: impl Into<String>) {
        self.attempt += 1;
        self.last_error = Some(error.into());
    }

    /// Whether another retry is allowed under the policy
    pub fn retries_remain(&self, policy: &RetryPolicy) -> bool {
        self.attempt <= policy.max_retries
    }

    /// The last recorded error, or a placeholder
    pub fn last_error_message(&self) -> String {
        self.last_error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_progression() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(6));
    }

    #[test]
    fn test_backoff_clamped_to_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(25),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(25));
    }

    #[test]
    fn test_classify_transient_patterns() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify("connection reset by peer"), ErrorClass::Transient);
        assert_eq!(policy.classify("HTTP 503 Service Unavailable"), ErrorClass::Transient);
        assert_eq!(policy.classify("request timeout"), ErrorClass::Transient);
        assert_eq!(policy.classify("rate limit exceeded"), ErrorClass::Transient);
        assert_eq!(policy.classify("server overloaded"), ErrorClass::Transient);
    }

    #[test]
    fn test_classify_fatal_patterns() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify("invalid API key"), ErrorClass::Fatal);
        assert_eq!(policy.classify("401 Unauthorized"), ErrorClass::Fatal);
        assert_eq!(policy.classify("malformed request body"), ErrorClass::Fatal);
    }

    #[test]
    fn test_retry_state_ceiling() {
        let policy = RetryPolicy::default();
        let mut state = RetryState::new();
        for _ in 0..3 {
            state.record("connection reset");
            assert!(state.retries_remain(&policy));
        }
        state.record("connection reset");
        assert!(!state.retries_remain(&policy));
        assert_eq!(state.attempt, 4);
        assert_eq!(state.last_error_message(), "connection reset");
    }
}
