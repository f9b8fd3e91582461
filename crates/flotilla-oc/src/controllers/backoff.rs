use std::time::Duration;

use adaptive_backoff::prelude::{BackoffBuilder, ExponentialBackoff, ExponentialBackoffBuilder};

/// per-key retry backoff shared by the control loops
pub fn create_backoff(min: Duration, max: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::default()
        .factor(2.0)
        .min(min)
        .max(max)
        .build()
        .unwrap()
}
