//! Reconnect delay calculation

use std::time::Duration;

/// Delay before the next reconnect attempt
///
/// `min(max_delay, base_delay * 2^attempts)`, where `attempts` is the number
/// of consecutive failures before this one (0 for the first retry).
pub fn reconnect_delay(attempts: u32, base_delay: Duration, max_delay: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
    base_delay
        .checked_mul(factor)
        .map(|delay| delay.min(max_delay))
        .unwrap_or(max_delay)
}
