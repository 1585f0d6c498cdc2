use serde::{Deserialize, Serialize};

// ─── Quantile family ─────────────────────────────────────────────

/// Every quantile the engine computes, in emission order.
pub const QUANTILES: [u8; 13] = [10, 20, 25, 30, 40, 50, 60, 70, 75, 80, 90, 95, 99];

/// `quantile_<q>th`, the canonical field name for quantile `q`.
pub fn quantile_label(q: u8) -> String {
    format!("quantile_{q}th")
}

pub fn quantile_labels() -> Vec<String> {
    QUANTILES.iter().map(|&q| quantile_label(q)).collect()
}

// ─── Helpers ─────────────────────────────────────────────────────

/// Linear interpolation between closest ranks: position `q·(n−1)` over an
/// ascending slice. `q` is a fraction in `[0, 1]`; an empty slice yields 0.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Sample variance (ddof = 1). Fewer than two samples → 0.
pub fn variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mu = mean(samples);
    let ss: f64 = samples.iter().map(|x| (x - mu) * (x - mu)).sum();
    ss / (samples.len() - 1) as f64
}

/// Replaces NaN/±Inf with 0 so every emitted number is finite.
pub fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Rate denominators: anything non-positive or non-finite becomes 1.
pub fn floor_denominator(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sorted_copy(samples: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        sorted.push(0.0);
    }
    sorted.sort_by(f64::total_cmp);
    sorted
}

// ─── StatSummary ─────────────────────────────────────────────────

/// Descriptive statistics plus the full quantile family for one series.
/// Serialised straight into every flat record the engine emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    pub median: f64,
    pub mean: f64,
    pub variance: f64,
    pub stdev: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub quantile_10th: f64,
    pub quantile_20th: f64,
    pub quantile_25th: f64,
    pub quantile_30th: f64,
    pub quantile_40th: f64,
    pub quantile_50th: f64,
    pub quantile_60th: f64,
    pub quantile_70th: f64,
    pub quantile_75th: f64,
    pub quantile_80th: f64,
    pub quantile_90th: f64,
    pub quantile_95th: f64,
    pub quantile_99th: f64,
}

impl StatSummary {
    /// Moments and extremes only; quantiles stay untouched.
    /// An empty series is treated as `[0]`.
    pub fn describe(samples: &[f64]) -> Self {
        let mut summary = Self::default();
        summary.apply_moments(samples);
        summary
    }

    /// Moments, extremes and quantiles in one pass over a sorted copy.
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut summary = Self::describe(samples);
        summary.fill_quantiles(samples);
        summary
    }

    pub fn apply_moments(&mut self, samples: &[f64]) {
        let sorted = sorted_copy(samples);
        let var = variance(&sorted);

        self.median = quantile_sorted(&sorted, 0.5);
        self.mean = mean(&sorted);
        self.variance = var;
        self.stdev = var.sqrt();
        self.minimum = sorted[0];
        self.maximum = sorted[sorted.len() - 1];
    }

    pub fn fill_quantiles(&mut self, samples: &[f64]) {
        let sorted = sorted_copy(samples);
        for q in QUANTILES {
            self.set_quantile(q, quantile_sorted(&sorted, f64::from(q) / 100.0));
        }
    }

    pub fn quantile(&self, q: u8) -> Option<f64> {
        let value = match q {
            10 => self.quantile_10th,
            20 => self.quantile_20th,
            25 => self.quantile_25th,
            30 => self.quantile_30th,
            40 => self.quantile_40th,
            50 => self.quantile_50th,
            60 => self.quantile_60th,
            70 => self.quantile_70th,
            75 => self.quantile_75th,
            80 => self.quantile_80th,
            90 => self.quantile_90th,
            95 => self.quantile_95th,
            99 => self.quantile_99th,
            _ => return None,
        };
        Some(value)
    }

    fn set_quantile(&mut self, q: u8, value: f64) {
        let slot = match q {
            10 => &mut self.quantile_10th,
            20 => &mut self.quantile_20th,
            25 => &mut self.quantile_25th,
            30 => &mut self.quantile_30th,
            40 => &mut self.quantile_40th,
            50 => &mut self.quantile_50th,
            60 => &mut self.quantile_60th,
            70 => &mut self.quantile_70th,
            75 => &mut self.quantile_75th,
            80 => &mut self.quantile_80th,
            90 => &mut self.quantile_90th,
            95 => &mut self.quantile_95th,
            99 => &mut self.quantile_99th,
            _ => return,
        };
        *slot = value;
    }

    /// `(q, value)` pairs in [`QUANTILES`] order.
    pub fn quantiles(&self) -> Vec<(u8, f64)> {
        QUANTILES
            .iter()
            .map(|&q| (q, self.quantile(q).unwrap_or_default()))
            .collect()
    }

    /// Flat `(field, value)` view used by keyed records.
    pub fn fields(&self) -> Vec<(String, f64)> {
        let mut fields = vec![
            ("median".to_string(), self.median),
            ("mean".to_string(), self.mean),
            ("variance".to_string(), self.variance),
            ("stdev".to_string(), self.stdev),
            ("minimum".to_string(), self.minimum),
            ("maximum".to_string(), self.maximum),
        ];
        fields.extend(self.quantiles().into_iter().map(|(q, v)| (quantile_label(q), v)));
        fields
    }

    pub fn sanitized(mut self) -> Self {
        for value in [
            &mut self.median,
            &mut self.mean,
            &mut self.variance,
            &mut self.stdev,
            &mut self.minimum,
            &mut self.maximum,
            &mut self.quantile_10th,
            &mut self.quantile_20th,
            &mut self.quantile_25th,
            &mut self.quantile_30th,
            &mut self.quantile_40th,
            &mut self.quantile_50th,
            &mut self.quantile_60th,
            &mut self.quantile_70th,
            &mut self.quantile_75th,
            &mut self.quantile_80th,
            &mut self.quantile_90th,
            &mut self.quantile_95th,
            &mut self.quantile_99th,
        ] {
            *value = finite(*value);
        }
        self
    }
}
