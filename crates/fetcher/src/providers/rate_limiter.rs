use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::warn;
use tokio::time::Instant;

use crate::models::settings::RateLimitSettings;

/// Sliding-window admission control for one data source.
///
/// Keeps the timestamps of admitted requests. `admit()` first evicts every
/// timestamp that fell out of the trailing window, then admits only if fewer
/// than `max_requests` remain. Check and record happen under one lock, so two
/// concurrent callers can never both take the last free slot.
///
/// Time comes from `tokio::time::Instant`, which lets tests drive the window
/// with a paused clock.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests.min(1024))),
        }
    }

    pub fn from_settings(settings: RateLimitSettings) -> Self {
        Self::new(settings.max_requests, settings.window())
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    // Admission state stays consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.admitted.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn evict_expired(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to take a slot in the current window. Returns `false` without
    /// recording anything when the window is full.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);
        if admitted.len() < self.max_requests {
            admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of admitted requests still inside the window.
    pub fn in_window_count(&self) -> usize {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);
        admitted.len()
    }

    /// Time until the oldest admitted request leaves the window, or zero if a
    /// slot is free right now.
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.evict_expired(&mut admitted, now);
        if admitted.len() < self.max_requests {
            return Duration::ZERO;
        }
        admitted
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }
}
