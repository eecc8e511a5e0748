//! Log-scale latency histogram for breath timing.
//!
//! Fixed bucket array spanning 1 microsecond to 1 second, 20 buckets per
//! decade, with underflow and overflow bins. Recording is a table index
//! and an increment; no allocation.

#![forbid(unsafe_code)]

use std::time::Duration;

const DECADES: usize = 6;
const PER_DECADE: usize = 20;
const BUCKETS: usize = DECADES * PER_DECADE;

/// Minimum resolvable latency: 1 microsecond.
const MIN_SECS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: [u64; BUCKETS],
    underflow: u64,
    overflow: u64,
    total: u64,
    sum_secs: f64,
}

impl Default for Histogram {
    fn default() -> Self {
        Histogram::new()
    }
}

impl Histogram {
    pub fn new() -> Histogram {
        Histogram {
            buckets: [0; BUCKETS],
            underflow: 0,
            overflow: 0,
            total: 0,
            sum_secs: 0.0,
        }
    }

    /// Record one latency observation.
    pub fn record(&mut self, d: Duration) {
        let secs = d.as_secs_f64();
        self.total += 1;
        self.sum_secs += secs;
        if secs < MIN_SECS {
            self.underflow += 1;
            return;
        }
        let index = ((secs / MIN_SECS).log10() * PER_DECADE as f64) as usize;
        if index >= BUCKETS {
            self.overflow += 1;
        } else {
            self.buckets[index] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Mean of all observations.
    pub fn mean(&self) -> Duration {
        if self.total == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.sum_secs / self.total as f64)
    }

    /// Approximate quantile from the bucket boundaries. `q` in [0, 1].
    pub fn quantile(&self, q: f64) -> Duration {
        if self.total == 0 {
            return Duration::ZERO;
        }
        let target = (q * self.total as f64) as u64;
        let mut seen = self.underflow;
        if seen > target {
            return Duration::from_secs_f64(MIN_SECS);
        }
        for (i, &count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen > target {
                let secs = MIN_SECS * 10f64.powf((i + 1) as f64 / PER_DECADE as f64);
                return Duration::from_secs_f64(secs);
            }
        }
        Duration::from_secs(1)
    }

    /// One-line summary for the end-of-run report.
    pub fn summary(&self) -> String {
        format!(
            "{} breaths, avg {:?}, p50 {:?}, p90 {:?}, p99 {:?}",
            self.total,
            self.mean(),
            self.quantile(0.50),
            self.quantile(0.90),
            self.quantile(0.99),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_land_in_ascending_buckets() {
        let mut h = Histogram::new();
        h.record(Duration::from_micros(2));
        h.record(Duration::from_millis(2));
        assert_eq!(h.total(), 2);
        assert!(h.quantile(0.0) < h.quantile(0.99));
    }

    #[test]
    fn out_of_range_is_counted() {
        let mut h = Histogram::new();
        h.record(Duration::from_nanos(10));
        h.record(Duration::from_secs(5));
        assert_eq!(h.underflow, 1);
        assert_eq!(h.overflow, 1);
        assert_eq!(h.total(), 2);
    }

    #[test]
    fn quantile_tracks_distribution() {
        let mut h = Histogram::new();
        for _ in 0..99 {
            h.record(Duration::from_micros(10));
        }
        h.record(Duration::from_millis(100));
        let p50 = h.quantile(0.5);
        let p99 = h.quantile(0.995);
        assert!(p50 < Duration::from_micros(20), "p50 {:?}", p50);
        assert!(p99 >= Duration::from_millis(50), "p99 {:?}", p99);
    }
}
