//! Reconnect backoff calculation.
//!
//! Pure, sync-only math. Scheduling the timer lives in `tether-manager`.
//!
//! Delay for the attempt following `attempts` earlier retries:
//! `min(base × 2^attempts, max_delay)`.

use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default base reconnect interval in milliseconds.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
/// Default maximum reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Ceiling applied to every reconnect delay, in milliseconds.
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 30_000;

// ─────────────────────────────────────────────────────────────────────────────
// Delay calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Delay in milliseconds before the next reconnect attempt.
///
/// `attempts` is the number of reconnect attempts already made (0 for the
/// first retry after a drop).
#[must_use]
pub fn reconnect_delay_ms(attempts: u32, base_ms: u64, max_delay_ms: u64) -> u64 {
    let exponential = base_ms.saturating_mul(1u64 << attempts.min(31));
    exponential.min(max_delay_ms)
}

/// [`reconnect_delay_ms`] as a [`Duration`].
#[must_use]
pub fn reconnect_delay(attempts: u32, base_ms: u64, max_delay_ms: u64) -> Duration {
    Duration::from_millis(reconnect_delay_ms(attempts, base_ms, max_delay_ms))
}

/// Outcome of consulting the reconnect policy after an unexpected close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Retry after `delay`; this will be attempt number `attempt` (1-based).
    Retry {
        /// 1-based index of the upcoming attempt.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Attempts are used up.
    Exhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Decide whether another reconnect attempt is allowed.
#[must_use]
pub fn next_reconnect(
    attempts: u32,
    max_attempts: u32,
    base_ms: u64,
    max_delay_ms: u64,
) -> ReconnectDecision {
    if attempts >= max_attempts {
        ReconnectDecision::Exhausted { attempts }
    } else {
        ReconnectDecision::Retry {
            attempt: attempts + 1,
            delay: reconnect_delay(attempts, base_ms, max_delay_ms),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
