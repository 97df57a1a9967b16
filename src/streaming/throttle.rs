//! Download bandwidth limiting shared between concurrent streams.

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bytes per limiter cell.
const CELL: u64 = 1024;

/// Per-stream limiter enforcing `total_kbps / active_streams`.
///
/// The allowance is recomputed on every call; the underlying GCRA limiter
/// is only rebuilt when the allowance actually changes.
pub struct BandwidthLimiter {
    total_kbps: u32,
    allowance_kbps: u32,
    limiter: Option<DirectLimiter>,
    burst: u32,
    clock: DefaultClock,
}

impl BandwidthLimiter {
    /// `total_kbps == 0` disables limiting.
    pub fn new(total_kbps: u32) -> Self {
        Self {
            total_kbps,
            allowance_kbps: 0,
            limiter: None,
            burst: 1,
            clock: DefaultClock::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.total_kbps > 0
    }

    /// Current per-stream allowance in kbit/s, 0 when unlimited.
    pub fn allowance_kbps(&self) -> u32 {
        self.allowance_kbps
    }

    /// Block until `bytes` more bytes fit into this stream's share.
    pub fn throttle(&mut self, bytes: usize, active_streams: usize) {
        if !self.is_enabled() || bytes == 0 {
            return;
        }

        let streams = u32::try_from(active_streams.max(1)).unwrap_or(u32::MAX);
        let allowance = (self.total_kbps / streams).max(1);
        if allowance != self.allowance_kbps || self.limiter.is_none() {
            self.rebuild(allowance);
        }

        let Some(limiter) = self.limiter.as_ref() else {
            return;
        };

        let mut cells = (bytes as u64).div_ceil(CELL);
        while cells > 0 {
            let take = cells.min(u64::from(self.burst)) as u32;
            let Some(n) = NonZeroU32::new(take) else {
                break;
            };
            loop {
                match limiter.check_n(n) {
                    Ok(Ok(())) => break,
                    Ok(Err(not_until)) => {
                        std::thread::sleep(not_until.wait_time_from(self.clock.now()));
                    }
                    // Cannot happen since `take <= burst`; give up rather than spin.
                    Err(_) => return,
                }
            }
            cells -= u64::from(take);
        }
    }

    fn rebuild(&mut self, allowance_kbps: u32) {
        let bytes_per_sec = u64::from(allowance_kbps) * 1000 / 8;
        let cells_per_sec = (bytes_per_sec / CELL).max(1);
        let cells_per_sec = u32::try_from(cells_per_sec).unwrap_or(u32::MAX);

        let rate = NonZeroU32::new(cells_per_sec).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(rate);

        self.limiter = Some(RateLimiter::direct(quota));
        self.burst = rate.get();
        self.allowance_kbps = allowance_kbps;
        tracing::trace!(allowance_kbps, "Rebuilt stream bandwidth limiter");
    }
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("total_kbps", &self.total_kbps)
            .field("allowance_kbps", &self.allowance_kbps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn disabled_limiter_never_blocks() {
        let mut limiter = BandwidthLimiter::new(0);
        let started = Instant::now();
        limiter.throttle(10_000_000, 1);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.allowance_kbps(), 0);
    }

    #[test]
    fn allowance_is_split_between_streams() {
        let mut limiter = BandwidthLimiter::new(1024);
        limiter.throttle(1, 1);
        assert_eq!(limiter.allowance_kbps(), 1024);
        limiter.throttle(1, 4);
        assert_eq!(limiter.allowance_kbps(), 256);
        limiter.throttle(1, 0);
        assert_eq!(limiter.allowance_kbps(), 1024);
    }

    #[test]
    fn throughput_is_limited() {
        // 8192 kbit/s is 1000 cells per second with burst 1000.
        let mut limiter = BandwidthLimiter::new(8192);
        let started = Instant::now();
        for _ in 0..200 {
            limiter.throttle(8192, 1);
        }
        // 1600 KiB: 1000 burst + 600 more at 1000/s.
        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
