//! Per-device latency tracking and the timeout it derives.
//!
//! Fixed 8-sample ring of the most recent round-trip times. Each
//! update re-derives the filtered value from the ring's current max,
//! smoothed asymmetrically: quick to track a rising max (spikes should
//! promptly loosen the timeout), slow to relax back down once the
//! spike scrolls out of the ring (so the timeout doesn't thrash every
//! time one slow poll is replaced by a fast one).

use std::time::Duration;

const RING_SIZE: usize = 8;

pub struct LatencyFilter {
    samples: [Duration; RING_SIZE],
    idx: usize,
    value: Duration,
}

impl Default for LatencyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyFilter {
    pub fn new() -> Self {
        Self {
            samples: [Duration::ZERO; RING_SIZE],
            idx: 0,
            value: Duration::ZERO,
        }
    }

    /// Records one round-trip sample and returns the updated filtered
    /// value.
    pub fn update(&mut self, sample: Duration) -> Duration {
        self.samples[self.idx] = sample;
        self.idx = (self.idx + 1) % RING_SIZE;
        let max = self.samples.iter().copied().max().unwrap_or(Duration::ZERO);

        self.value = if max > self.value {
            self.value.mul_f64(0.25) + max.mul_f64(0.75)
        } else {
            self.value.mul_f64(0.75) + max.mul_f64(0.25)
        };
        self.value
    }

    pub fn filtered(&self) -> Duration {
        self.value
    }

    /// Device timeout given a per-driver floor: `max(min_timeout, 4 *
    /// filtered)`.
    pub fn timeout(&self, min_timeout: Duration) -> Duration {
        std::cmp::max(min_timeout, self.value.mul_f64(4.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_floors_at_min_timeout_when_quiet() {
        let filter = LatencyFilter::new();
        assert_eq!(
            filter.timeout(Duration::from_millis(300)),
            Duration::from_millis(300)
        );
    }

    #[test]
    fn rising_spike_pulls_filtered_value_up_quickly() {
        let mut filter = LatencyFilter::new();
        for _ in 0..RING_SIZE {
            filter.update(Duration::from_millis(10));
        }
        let before = filter.filtered();
        let after_spike = filter.update(Duration::from_millis(200));
        // 0.25*before + 0.75*200ms, with `before` converged near 10ms: ~152.5ms.
        let expected = before.mul_f64(0.25) + Duration::from_millis(200).mul_f64(0.75);
        assert_eq!(after_spike, expected);
        assert!(after_spike > Duration::from_millis(140));
    }

    #[test]
    fn falling_max_relaxes_filtered_value_slowly() {
        let mut filter = LatencyFilter::new();
        for _ in 0..RING_SIZE {
            filter.update(Duration::from_millis(200));
        }
        // ring is now full of 200ms samples, filtered value converged near 200ms.
        let before = filter.filtered();
        assert!(before > Duration::from_millis(195));
        // replace one sample with a fast one; max across the ring is still
        // 200ms (seven other slots unchanged), so filtered should not drop.
        let after = filter.update(Duration::from_millis(1));
        assert!(after >= before);
    }

    #[test]
    fn timeout_scales_to_four_times_filtered() {
        let mut filter = LatencyFilter::new();
        for _ in 0..RING_SIZE {
            filter.update(Duration::from_millis(100));
        }
        let timeout = filter.timeout(Duration::from_millis(1));
        assert_eq!(timeout, Duration::from_millis(400));
    }
}
