use std::time::Duration;

use rand::Rng;

#[cfg(test)]
const BASE_DELAY_MS: u64 = 5;
#[cfg(not(test))]
const BASE_DELAY_MS: u64 = 500;

#[cfg(test)]
const MAX_DELAY_MS: u64 = 1_000;
#[cfg(not(test))]
const MAX_DELAY_MS: u64 = 30_000;

/// Exponential delay with jitter, capped at `MAX_DELAY_MS`.
pub(crate) fn delay(attempt: u32) -> Duration {
    let pow = attempt.min(16);
    let capped = BASE_DELAY_MS.saturating_mul(1u64 << pow).min(MAX_DELAY_MS);
    let jitter = if capped == 0 {
        0
    } else {
        rand::rng().random_range(0..capped)
    };
    Duration::from_millis(capped.saturating_add(jitter).min(MAX_DELAY_MS))
}

pub(crate) async fn sleep(attempt: u32) {
    tokio::time::sleep(delay(attempt)).await;
}
