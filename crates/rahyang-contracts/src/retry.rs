use std::time::Duration;

/// Classified failure of a generation request or job.
///
/// Every provider response is mapped into one of these variants at the
/// adapter boundary; nothing past that boundary inspects raw provider JSON.
/// The classification drives both retry decisions ([`GenError::is_retryable`])
/// and the user-facing message (the `Display` impl).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenError {
    /// The provider refused on safety/content-policy grounds. Retrying
    /// cannot change a policy rejection.
    #[error("content blocked by safety policy: {reason}")]
    ContentPolicyBlock { reason: String },

    /// The provider answered but carried no usable payload.
    #[error("no {what} returned from the API")]
    TransientNoData { what: String },

    /// Rate or billing limits hit. Surfaced with an actionable message
    /// because this is the dominant real-world failure mode.
    #[error("API quota exhausted ({detail}); check billing and quota for the key")]
    QuotaExceeded { detail: String },

    /// An asynchronous job reached a terminal error state reported by the
    /// provider itself.
    #[error("generation operation failed: {message}")]
    OperationFailed { message: String },

    /// Job reported success but no retrievable artifact was present.
    #[error("operation completed without a retrievable artifact")]
    MissingArtifact,

    #[error("operation timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("operation cancelled")]
    Cancelled,

    /// Network-level failure (connect, TLS, read) or a 5xx answer.
    #[error("transport failure: {detail}")]
    Transport { detail: String },

    /// The provider answered with a shape or status the adapter cannot map
    /// to a success (4xx other than quota, undecodable payloads).
    #[error("invalid provider response: {detail}")]
    InvalidResponse { detail: String },
}

impl GenError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenError::TransientNoData { .. } | GenError::Transport { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

/// Bounded retry schedule for a single request chain.
///
/// `max_attempts` counts invocations, so a policy produces at most
/// `max_attempts - 1` waits. The wait between attempt `i` and `i + 1` is
/// `delays[i - 1]`; a schedule shorter than the attempt count repeats its
/// last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// Single attempt, no waits.
    pub fn once() -> Self {
        Self::new(1, Vec::new())
    }

    /// Doubling schedule starting at two seconds: 2s, 4s, 8s, ...
    pub fn fixed_doubling(max_attempts: usize) -> Self {
        let waits = max_attempts.saturating_sub(1).max(1);
        let delays = (0..waits)
            .map(|gap| Duration::from_secs(2u64 << gap))
            .collect();
        Self::new(max_attempts, delays)
    }

    /// Linear schedule: `step`, `2 * step`, `3 * step`, ...
    pub fn linear(max_attempts: usize, step: Duration) -> Self {
        let waits = max_attempts.saturating_sub(1).max(1);
        let delays = (1..=waits as u32).map(|gap| step * gap).collect();
        Self::new(max_attempts, delays)
    }

    /// Wait to apply after `completed_attempts` failed invocations.
    pub fn delay_after(&self, completed_attempts: usize) -> Duration {
        let index = completed_attempts.saturating_sub(1);
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
