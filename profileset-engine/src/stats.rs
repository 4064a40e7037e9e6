//! Seven-number summaries of raw sample distributions.
//!
//! Quartiles use linear interpolation between nearest ranks of the sorted
//! samples; the standard deviation is the population standard deviation.
use serde::{Deserialize, Serialize};

use crate::numbers::{floor_f64_to_index, usize_to_f64};

/// Raw per-iteration samples accumulated for one metric of one actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleData {
    samples: Vec<f64>,
}

impl SampleData {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub const fn from_samples(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    pub fn add(&mut self, value: f64) {
        self.samples.push(value);
    }

    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl FromIterator<f64> for SampleData {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Self::from_samples(iter.into_iter().collect())
    }
}

/// Immutable summary of a sample distribution.
///
/// Always satisfies `min <= first_quartile <= median <= third_quartile <= max`
/// and `std_dev >= 0` when produced by [`collect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub min: f64,
    pub first_quartile: f64,
    pub median: f64,
    pub mean: f64,
    pub third_quartile: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl StatisticalSummary {
    pub const ZERO: Self = Self::uniform(0.0);

    /// Summary of a distribution where every sample equals `value`.
    #[must_use]
    pub const fn uniform(value: f64) -> Self {
        Self {
            min: value,
            first_quartile: value,
            median: value,
            mean: value,
            third_quartile: value,
            max: value,
            std_dev: 0.0,
        }
    }
}

/// Reduce a sample distribution to its seven-number summary.
///
/// Non-finite samples are ignored. An empty distribution yields
/// [`StatisticalSummary::ZERO`] and a single sample yields a uniform summary;
/// neither case is an error.
#[must_use]
pub fn collect(data: &SampleData) -> StatisticalSummary {
    let mut sorted: Vec<f64> = data
        .samples()
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .collect();
    sorted.sort_by(f64::total_cmp);

    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return StatisticalSummary::ZERO;
    };
    if sorted.len() == 1 {
        return StatisticalSummary::uniform(min);
    }

    let count = usize_to_f64(sorted.len());
    let mean = (sorted.iter().sum::<f64>() / count).clamp(min, max);
    let variance = sorted
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / count;

    StatisticalSummary {
        min,
        first_quartile: interpolate(&sorted, 0.25),
        median: interpolate(&sorted, 0.5),
        mean,
        third_quartile: interpolate(&sorted, 0.75),
        max,
        std_dev: variance.max(0.0).sqrt(),
    }
}

fn interpolate(sorted: &[f64], fraction: f64) -> f64 {
    let last = sorted.len().saturating_sub(1);
    let rank = fraction * usize_to_f64(last);
    let lower_idx = floor_f64_to_index(rank).min(last);
    let upper_idx = (lower_idx + 1).min(last);
    let (Some(&lower), Some(&upper)) = (sorted.get(lower_idx), sorted.get(upper_idx)) else {
        return 0.0;
    };
    let weight = rank - usize_to_f64(lower_idx);
    (lower + weight * (upper - lower)).clamp(lower, upper)
}
