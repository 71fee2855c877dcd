//! # Retry Logic and Backoff
//!
//! Bounded retry for queue records whose remote apply failed. Each failure
//! pushes `next_attempt_at` out exponentially; once `max_attempts` is reached
//! the record is parked instead of retried forever.

use crate::shared::config::RetrySettings;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// What the queue should do with a record after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again no earlier than this instant
    RetryAt(DateTime<Utc>),
    /// Stop retrying; the record is kept but skipped until requeued
    Park,
}

/// Exponential backoff with a cap and proportional jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added at random, in [0, 1]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter: settings.jitter.clamp(0.0, 1.0),
        }
    }

    /// No delay between attempts; records become due again immediately
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Backoff before attempt `attempts + 1`, given `attempts` failures so far
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = delay.mul_f64(self.jitter * rand::thread_rng().gen::<f64>());
        delay + extra
    }

    /// Decide the fate of a record that has now failed `attempts` times
    pub fn decide(&self, attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::Park;
        }
        let delay = chrono::Duration::from_std(self.delay_for(attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        RetryDecision::RetryAt(now + delay)
    }
}
