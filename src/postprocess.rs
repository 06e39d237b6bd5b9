//! Turning continuous model predictions back into calls.

use ndarray::Array2;

use crate::error::MethBinsError;
use crate::matrix::Call;

pub const DEFAULT_LOW_THRESHOLD: f64 = 0.2;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.8;

/// Cut-offs for calling a prediction: `v <= low` is unmethylated, `v >= high`
/// is methylated, and anything in between stays missing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    low: f64,
    high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(low: f64, high: f64) -> Result<Self, MethBinsError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(low) || !in_unit(high) {
            return Err(MethBinsError::InvalidConfig(format!(
                "thresholds must lie in [0, 1], got low = {}, high = {}",
                low, high
            )));
        }
        if low > high {
            return Err(MethBinsError::InvalidConfig(format!(
                "low threshold {} is above high threshold {}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Call a single prediction. Total: NaN and out-of-range values that are
    /// not beyond a threshold are [`Call::Missing`].
    pub fn call(&self, value: f64) -> Call {
        if value == 0.0 || value == 1.0 {
            Call::from_f64(value)
        } else if value <= self.low {
            Call::Zero
        } else if value >= self.high {
            Call::One
        } else {
            Call::Missing
        }
    }
}

/// Threshold every cell of a prediction independently.
pub fn postprocess(predicted: &Array2<f64>, thresholds: &Thresholds) -> Array2<Call> {
    predicted.mapv(|value| thresholds.call(value))
}
