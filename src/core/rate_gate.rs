//! # Rate Gate
//!
//! Sliding-window admission control: at most `quota` admissions inside any
//! trailing `window`. Check-and-record happens under one lock, so concurrent
//! workers can never push the window over quota.
//!
//! Rejected attempts are not recorded. A caller that is refused gets
//! `ErrorKind::RateLimited` and does not retry, so there is no burst of refusals to
//! dampen, and the window keeps describing what actually reached the server.

use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_QUOTA: usize = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

pub struct RateGate {
    quota: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    pub fn new(quota: usize, window: Duration) -> Self {
        Self {
            quota,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(quota)),
        }
    }

    pub fn try_admit(&self) -> bool {
        self.try_admit_at(Instant::now())
    }

    /// Admission decision as of `now`.
    pub fn try_admit_at(&self, now: Instant) -> bool {
        let mut admitted = match self.admitted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Entries exactly `window` old have left the window.
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() >= self.quota {
            warn!(
                "Rate limit reached: {} requests in the last {:?}",
                admitted.len(),
                self.window
            );
            return false;
        }

        admitted.push_back(now);
        debug!("Admitted request ({}/{})", admitted.len(), self.quota);
        true
    }

    /// Admissions currently inside the window, as of `now`.
    #[cfg(test)]
    pub fn in_window_at(&self, now: Instant) -> usize {
        let admitted = match self.admitted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        admitted
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count()
    }
}
