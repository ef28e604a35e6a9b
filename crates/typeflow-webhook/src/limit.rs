//! Per-webhook rate limiting.
//!
//! Each webhook gets its own token bucket sized to its requests-per-minute
//! quota, keyed by `(organization_id, path)`. A webhook whose quota changes
//! gets a fresh bucket on the next request.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::error::IngressError;

pub struct WebhookRateLimiter {
  clock: DefaultClock,
  buckets: Mutex<HashMap<String, (u32, Arc<DefaultDirectRateLimiter>)>>,
}

impl Default for WebhookRateLimiter {
  fn default() -> Self {
    Self::new()
  }
}

impl WebhookRateLimiter {
  pub fn new() -> Self {
    Self {
      clock: DefaultClock::default(),
      buckets: Mutex::new(HashMap::new()),
    }
  }

  /// Admit or reject a request. `per_minute = 0` disables the limit.
  pub fn check(
    &self,
    organization_id: &str,
    path: &str,
    per_minute: u32,
  ) -> Result<(), IngressError> {
    let Some(quota) = NonZeroU32::new(per_minute) else {
      return Ok(());
    };

    let key = format!("{}/{}", organization_id, path);
    let limiter = {
      let Ok(mut buckets) = self.buckets.lock() else {
        return Ok(());
      };
      match buckets.get(&key) {
        Some((stored_quota, limiter)) if *stored_quota == per_minute => limiter.clone(),
        _ => {
          let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(quota)));
          buckets.insert(key, (per_minute, limiter.clone()));
          limiter
        }
      }
    };

    match limiter.check() {
      Ok(_) => Ok(()),
      Err(not_until) => {
        let wait = not_until.wait_time_from(self.clock.now());
        let retry_after_secs = wait.as_secs().max(1);
        Err(IngressError::RateLimited {
          retry_after_secs,
          reset_at_epoch_secs: Utc::now().timestamp() + retry_after_secs as i64,
        })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_quota_is_unlimited() {
    let limiter = WebhookRateLimiter::new();
    for _ in 0..1000 {
      limiter.check("org", "hook", 0).unwrap();
    }
  }

  #[test]
  fn accepts_at_most_the_quota_in_a_burst() {
    let limiter = WebhookRateLimiter::new();
    for _ in 0..5 {
      limiter.check("org", "hook", 5).unwrap();
    }
    let err = limiter.check("org", "hook", 5).unwrap_err();
    match err {
      IngressError::RateLimited {
        retry_after_secs, ..
      } => assert!(retry_after_secs >= 1),
      other => panic!("expected rate limit, got {:?}", other),
    }
  }

  #[test]
  fn buckets_are_per_webhook() {
    let limiter = WebhookRateLimiter::new();
    for _ in 0..3 {
      limiter.check("org", "a", 3).unwrap();
    }
    assert!(limiter.check("org", "a", 3).is_err());
    // A different path has its own bucket.
    limiter.check("org", "b", 3).unwrap();
  }

  #[test]
  fn quota_change_resets_the_bucket() {
    let limiter = WebhookRateLimiter::new();
    for _ in 0..2 {
      limiter.check("org", "hook", 2).unwrap();
    }
    assert!(limiter.check("org", "hook", 2).is_err());
    // Raising the quota installs a fresh bucket.
    limiter.check("org", "hook", 10).unwrap();
  }
}
