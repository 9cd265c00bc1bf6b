use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default window over which throughput is averaged.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Maximum retained samples regardless of window.
const MAX_SAMPLES: usize = 256;

/// Sliding-window throughput estimate for one transaction.
///
/// Owned by a single writer (the coordinator), so no interior locking.
#[derive(Debug)]
pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
        }
    }

    /// Records `bytes` confirmed now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    fn record_at(&mut self, at: Instant, bytes: u64) {
        self.samples.push_back((at, bytes));
        while let Some(&(oldest, _)) = self.samples.front() {
            if at.duration_since(oldest) > self.window || self.samples.len() > MAX_SAMPLES {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Average bytes per second inside the window; 0.0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let (Some(&(first, _)), Some(&(last, _))) = (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = last.duration_since(first);
        if self.samples.len() < 2 || elapsed.is_zero() {
            return 0.0;
        }
        let total: u64 = self.samples.iter().map(|&(_, bytes)| bytes).sum();
        total as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to move `remaining_bytes`, or `None` without a rate.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / rate))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
