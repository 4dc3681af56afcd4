//! Delay policy for pacing and retries.
//!
//! [`RateController::next_delay`] is a pure function of its inputs: the same
//! attempt index, error kind and random source state always produce the same
//! delay. Coarser pacing (between projects, between batches) is a fixed delay
//! taken straight from configuration.

use core::time::Duration;
use rand::Rng;

/// Classification of a failed (or successful) request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No failure; the delay is ordinary request pacing.
    None,

    /// HTTP 401: the proof was rejected or the challenge expired.
    Auth,

    /// HTTP 429: the remote asked us to slow down.
    Throttle,

    /// HTTP 5xx.
    ServerError,

    /// Transport failures, challenge failures and unclassified statuses.
    Network,
}

/// Backoff used for server errors regardless of the configured multiplier.
const SERVER_ERROR_BACKOFF: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct RateController {
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub max_delay: Duration,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub project_delay: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl RateController {
    /// A controller that never waits. Handy for tests and dry runs.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            max_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            project_delay: Duration::ZERO,
            batch_size: 0,
            batch_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before the next attempt.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed, or
    /// of the request about to be made when `kind` is [`ErrorKind::None`].
    pub fn next_delay(&self, attempt: u32, kind: ErrorKind, rng: &mut impl Rng) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        let delay = match kind {
            ErrorKind::Auth => scale(self.retry_delay, self.backoff_multiplier.powi(exponent)),
            ErrorKind::Throttle => scale(self.retry_delay, self.backoff_multiplier.powi(exponent.saturating_add(1))),
            ErrorKind::ServerError => scale(self.retry_delay, SERVER_ERROR_BACKOFF.powi(exponent)),
            ErrorKind::Network | ErrorKind::None => self.base_delay.saturating_add(self.jitter(rng)),
        };

        delay.min(self.max_delay)
    }

    /// Pause before the first request of every project after the first.
    #[must_use]
    pub const fn between_projects(&self) -> Duration {
        self.project_delay
    }

    /// Extra pause owed after `projects_done` projects, if a batch boundary was reached.
    #[must_use]
    pub fn between_batches(&self, projects_done: usize) -> Option<Duration> {
        (self.batch_size > 0 && projects_done > 0 && projects_done % self.batch_size == 0).then_some(self.batch_delay)
    }

    fn jitter(&self, rng: &mut impl Rng) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }

        #[expect(clippy::cast_possible_truncation, reason = "jitter is configured in milliseconds well below u64::MAX")]
        let max_ms = self.max_jitter.as_millis() as u64;
        Duration::from_millis(rng.gen_range(0..=max_ms))
    }
}

/// Multiply `base` by `factor`, saturating instead of overflowing.
fn scale(base: Duration, factor: f64) -> Duration {
    let secs = base.as_secs_f64() * factor;
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::MAX
    }
}
