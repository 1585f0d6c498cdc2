use std::fmt;

use hdrhistogram::Histogram;

use super::percentiles::{finite, StatSummary};

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range for the median estimator: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

const MICROS_PER_SEC: f64 = 1_000_000.0;

// ─── Estimators ──────────────────────────────────────────────────

/// Running mean of every value fed in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamingMean {
    count: u64,
    mean: f64,
}

impl StreamingMean {
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        self.mean += (finite(value) - self.mean) / self.count as f64;
    }

    pub fn get(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Fed per-group variances; reports their running mean (equal-weight pooling).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamingVariance {
    pooled: StreamingMean,
}

impl StreamingVariance {
    pub fn update(&mut self, variance: f64) {
        self.pooled.update(variance.max(0.0));
    }

    pub fn get(&self) -> f64 {
        self.pooled.get()
    }
}

/// Fed per-group standard deviations; pools them through their squares so
/// the result stays consistent with [`StreamingVariance`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamingStdev {
    squares: StreamingMean,
}

impl StreamingStdev {
    pub fn update(&mut self, stdev: f64) {
        self.squares.update(stdev * stdev);
    }

    pub fn get(&self) -> f64 {
        self.squares.get().max(0.0).sqrt()
    }
}

/// Median of every value fed in, kept in a microsecond HdrHistogram so
/// memory stays bounded regardless of how many estimates arrive.
#[derive(Clone)]
pub struct StreamingMedian {
    hist: Histogram<u64>,
}

impl StreamingMedian {
    pub fn new() -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
        }
    }

    pub fn update(&mut self, seconds: f64) {
        let micros = (finite(seconds).max(0.0) * MICROS_PER_SEC).round() as u64;
        self.hist.saturating_record(micros);
    }

    pub fn get(&self) -> f64 {
        if self.hist.len() == 0 {
            return 0.0;
        }
        let bucket = self.hist.value_at_quantile(0.5);
        self.hist.median_equivalent(bucket) as f64 / MICROS_PER_SEC
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}

impl Default for StreamingMedian {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamingMedian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingMedian")
            .field("count", &self.count())
            .field("median", &self.get())
            .finish()
    }
}

// ─── Per-phase bundle ────────────────────────────────────────────

/// The four estimators a processed-results group keeps for each phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseEstimators {
    pub median: StreamingMedian,
    pub mean: StreamingMean,
    pub variance: StreamingVariance,
    pub stdev: StreamingStdev,
}

impl PhaseEstimators {
    /// Feed one group's point estimates.
    pub fn update(&mut self, stats: &StatSummary) {
        self.median.update(stats.median);
        self.mean.update(stats.mean);
        self.variance.update(stats.variance);
        self.stdev.update(stats.stdev);
    }

    /// Overwrite the central-tendency fields of `stats` with the current estimates.
    pub fn apply(&self, stats: &mut StatSummary) {
        stats.median = self.median.get();
        stats.mean = self.mean.get();
        stats.variance = self.variance.get();
        stats.stdev = self.stdev.get();
    }
}
