//! Retry delays.
//!
//! For failed attempt `n` (1-based) with base delay `b`:
//! - constant: `b`
//! - linear: `b * n`
//! - exponential: `b * 2^(n-1)`
//!
//! Every schedule is capped at [`MAX_BACKOFF_MS`] before jitter.
//!
//! With a jitter seed, a value in `[0, delay / 2]` drawn from a generator seeded
//! with `seed ^ n` is added. The same seed always yields the same schedule.

use std::time::Duration;

use loom_workflow::{RetryBackoff, WorkflowDefinition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const MAX_BACKOFF_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_retries: u32,
  pub backoff: RetryBackoff,
  pub base_ms: u64,
  pub jitter_seed: Option<u64>,
}

impl RetryPolicy {
  pub fn from_definition(def: &WorkflowDefinition) -> Self {
    Self {
      max_retries: def.max_retries,
      backoff: def.retry_backoff,
      base_ms: def.retry_backoff_ms,
      jitter_seed: def.retry_jitter_seed,
    }
  }

  /// Whether failed attempt `attempt` may be followed by another.
  pub fn allows_retry(&self, attempt: u32) -> bool {
    attempt <= self.max_retries
  }

  pub fn delay_ms(&self, attempt: u32) -> u64 {
    let n = attempt.max(1);
    let delay = match self.backoff {
      RetryBackoff::Constant => self.base_ms,
      RetryBackoff::Linear => self.base_ms.saturating_mul(u64::from(n)),
      RetryBackoff::Exponential => self.base_ms.saturating_mul(2u64.saturating_pow(n - 1)),
    }
    .min(MAX_BACKOFF_MS);

    match self.jitter_seed {
      Some(seed) => {
        let mut rng = StdRng::seed_from_u64(seed ^ u64::from(n));
        delay.saturating_add(rng.gen_range(0..=delay / 2))
      }
      None => delay,
    }
  }

  pub fn delay(&self, attempt: u32) -> Duration {
    Duration::from_millis(self.delay_ms(attempt))
  }
}
