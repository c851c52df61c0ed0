use std::time::Duration;

/// High-level classification of a collaborator failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network blip, timeout, rate limit, 5xx.
    Transient,
    /// Remote end not reachable (DNS, refused, unmounted share).
    Connection,
    /// Credentials rejected; retried in case the remote recovers, surfaced on give-up.
    Auth,
    /// Video removed, private, blocked. Never retried.
    Unavailable,
    /// Live broadcast in progress. Never retried; the job is skipped.
    LiveInProgress,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Connection | ErrorKind::Auth)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps. Built from `[retry]` in the config.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Compute the next backoff delay for a given attempt and error kind.
    ///
    /// `attempt` is 1-based (1 = first attempt just failed). Returns
    /// `RetryDecision::NoRetry` when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts || !kind.is_retryable() {
            return RetryDecision::NoRetry;
        }

        // base * 2^(attempt-1), capped.
        let exp = 1u32 << attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(exp);
        RetryDecision::RetryAfter(raw.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_for_terminal_content() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Unavailable), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::LiveInProgress), RetryDecision::NoRetry);
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 40,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        };
        let d1 = match p.decide(1, ErrorKind::Transient) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        let d2 = match p.decide(2, ErrorKind::Transient) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        assert_eq!(d1, Duration::from_secs(30));
        assert_eq!(d2, Duration::from_secs(60));

        let d_last = match p.decide(30, ErrorKind::Connection) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        assert_eq!(d_last, p.max_delay);
    }

    #[test]
    fn respects_max_attempts() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(matches!(p.decide(1, ErrorKind::Auth), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, ErrorKind::Auth), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorKind::Auth), RetryDecision::NoRetry);
    }
}
