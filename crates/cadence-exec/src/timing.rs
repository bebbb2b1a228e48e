//! Precise sleep: coarse 1ms sleeps refined by a Welford online
//! mean/variance estimate of actual sleep overshoot, then a final
//! spin-yield sliver (spec §4.G, §9).

use std::thread;
use std::time::{Duration, Instant};

/// Online mean/variance of observed sleep durations, used to derive
/// `sleepEstimate = mean + stddev` for the coarse phase of a precise
/// sleep.
#[derive(Debug, Clone)]
pub struct SleepEstimator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl SleepEstimator {
    pub fn new() -> Self {
        Self { count: 0, mean: 0.0, m2: 0.0 }
    }

    fn observe(&mut self, sample_secs: f64) {
        self.count += 1;
        let delta = sample_secs - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = sample_secs - self.mean;
        self.m2 += delta * delta2;
    }

    fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    fn estimate(&self) -> Duration {
        if self.count == 0 {
            Duration::from_millis(1)
        } else {
            Duration::from_secs_f64((self.mean + self.stddev()).max(0.0))
        }
    }

    /// Sleeps until `deadline`: while the remaining time exceeds the
    /// current estimate, sleeps 1ms at a time and folds the observed
    /// duration into the estimate; once the remainder is within the
    /// estimate, spin-yields the rest of the way.
    pub fn sleep_until(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = deadline - now;
            if remaining <= self.estimate() {
                break;
            }
            let before = Instant::now();
            thread::sleep(Duration::from_millis(1));
            self.observe(before.elapsed().as_secs_f64());
        }
        while Instant::now() < deadline {
            thread::yield_now();
        }
    }
}

impl Default for SleepEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_seeds_at_one_millisecond_before_any_samples() {
        let est = SleepEstimator::new();
        assert_eq!(est.estimate(), Duration::from_millis(1));
    }

    #[test]
    fn estimator_tracks_observed_mean() {
        let mut est = SleepEstimator::new();
        for _ in 0..8 {
            est.observe(0.002);
        }
        assert!((est.mean - 0.002).abs() < 1e-6);
        assert_eq!(est.stddev(), 0.0);
    }

    #[test]
    fn sleep_until_never_returns_before_the_deadline() {
        let mut est = SleepEstimator::new();
        let deadline = Instant::now() + Duration::from_millis(4);
        est.sleep_until(deadline);
        assert!(Instant::now() >= deadline);
    }
}
