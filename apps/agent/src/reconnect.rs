use std::time::Duration;

use rand::Rng;
use tunnl_common::constants::{
    RECONNECT_BASE_DELAY_MS, RECONNECT_JITTER_FRACTION, RECONNECT_MAX_DELAY_MS,
};

/// Delay between a disconnect and the first reconnection attempt of an
/// episode
pub fn initial_delay() -> Duration {
    Duration::from_millis(RECONNECT_BASE_DELAY_MS)
}

/// Delay before the attempt that follows the `failed_attempts`-th failure
/// of an episode: doubles per failure from the base, capped at the
/// ceiling.
pub fn backoff_delay(failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(16);
    let millis = RECONNECT_BASE_DELAY_MS
        .saturating_mul(1u64 << exponent)
        .min(RECONNECT_MAX_DELAY_MS);
    Duration::from_millis(millis)
}

/// Spread a delay by up to [`RECONNECT_JITTER_FRACTION`]
pub fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.0..RECONNECT_JITTER_FRACTION);
    delay + delay.mul_f64(factor)
}
