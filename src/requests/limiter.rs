//! Process-wide admission control for outbound requests

use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{self, Instant};

/// Bounds the number of requests in flight and spaces out their starts.
///
/// One limiter is constructed per process and shared through an [`Arc`](std::sync::Arc)
/// by every component that talks to the network.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Semaphore,
    max_in_flight: usize,
    min_interval: Duration,
    next_start: Mutex<Instant>,
}

/// Held for the duration of one request
#[derive(Debug)]
pub struct Admission<'a> {
    _permit: SemaphorePermit<'a>,
}

impl RateLimiter {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

    pub fn new(max_in_flight: usize, min_interval: Duration) -> Self {
        let max_in_flight = max_in_flight.max(1);

        Self {
            permits: Semaphore::new(max_in_flight),
            max_in_flight,
            min_interval,
            next_start: Mutex::new(Instant::now()),
        }
    }

    /// Waits until a request may start
    pub async fn acquire(&self) -> Admission<'_> {
        let permit = self
            .permits
            .acquire()
            .await
            .expect("limiter semaphore is never closed");

        if !self.min_interval.is_zero() {
            // the lock is held while sleeping so that starts are queued one interval apart
            let mut next_start = self.next_start.lock().await;
            let now = Instant::now();

            if *next_start > now {
                tracing::trace!("delaying request by {:?}", *next_start - now);
                time::sleep_until(*next_start).await;
            }

            *next_start = (*next_start).max(now) + self.min_interval;
        }

        Admission { _permit: permit }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_IN_FLIGHT, Self::DEFAULT_MIN_INTERVAL)
    }
}
