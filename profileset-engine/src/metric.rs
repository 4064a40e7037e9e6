//! Metric kinds and per-variant metric results.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProfilesetError;
use crate::sim::PlayerReport;
use crate::stats::{StatisticalSummary, collect};

/// Performance measure tracked for a profile set.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Placeholder kind carried by results that were never produced.
    #[default]
    None,
    /// Damage per second
    Dps,
    /// Damage per second, effective (fight length adjusted)
    Dpse,
    /// Healing per second
    Hps,
    /// Healing per second, effective
    Hpse,
    /// Absorb per second
    Aps,
    /// Healing and absorb per second combined
    Haps,
    /// Damage per second of owned units
    Dpsp,
    /// Healing taken per second
    Htps,
    /// Damage taken per second
    Dtps,
    /// Total damage taken
    DmgTaken,
    /// Theck-Meloree index
    Tmi,
    /// Effective Theck-Meloree index
    Etmi,
    /// Deaths per iteration
    Deaths,
}

impl MetricKind {
    pub const ALL: [Self; 14] = [
        Self::None,
        Self::Dps,
        Self::Dpse,
        Self::Hps,
        Self::Hpse,
        Self::Aps,
        Self::Haps,
        Self::Dpsp,
        Self::Htps,
        Self::Dtps,
        Self::DmgTaken,
        Self::Tmi,
        Self::Etmi,
        Self::Deaths,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Dps => "dps",
            Self::Dpse => "dpse",
            Self::Hps => "hps",
            Self::Hpse => "hpse",
            Self::Aps => "aps",
            Self::Haps => "haps",
            Self::Dpsp => "dpsp",
            Self::Htps => "htps",
            Self::Dtps => "dtps",
            Self::DmgTaken => "dmg_taken",
            Self::Tmi => "tmi",
            Self::Etmi => "etmi",
            Self::Deaths => "deaths",
        }
    }

    /// Whether a single actor's collected data can produce this metric.
    #[must_use]
    pub const fn is_collectable(self) -> bool {
        !matches!(self, Self::None | Self::Haps | Self::Dpsp)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MetricKind {
    type Err = ProfilesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ProfilesetError::UnknownMetric {
                name: wanted.to_string(),
            })
    }
}

/// Summary of one metric for one profile set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    kind: MetricKind,
    summary: StatisticalSummary,
    iterations: u64,
}

impl MetricResult {
    /// Zero-valued result returned for metrics a profile set never produced.
    pub const PLACEHOLDER: Self = Self::new(MetricKind::None, StatisticalSummary::ZERO, 0);

    #[must_use]
    pub const fn new(kind: MetricKind, summary: StatisticalSummary, iterations: u64) -> Self {
        Self {
            kind,
            summary,
            iterations,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        self.kind
    }

    #[must_use]
    pub const fn summary(&self) -> &StatisticalSummary {
        &self.summary
    }

    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    #[must_use]
    pub const fn mean(&self) -> f64 {
        self.summary.mean
    }

    #[must_use]
    pub const fn median(&self) -> f64 {
        self.summary.median
    }
}

/// Extract the distribution of `kind` from a simulated actor and summarize it.
///
/// An actor that never accumulated samples for a collectable metric yields the
/// zero summary.
///
/// # Errors
///
/// Returns [`ProfilesetError::UnsupportedMetric`] for kinds that cannot be
/// computed from a single actor.
pub fn metric_data(
    player: &PlayerReport,
    kind: MetricKind,
) -> Result<StatisticalSummary, ProfilesetError> {
    if !kind.is_collectable() {
        return Err(ProfilesetError::UnsupportedMetric { kind });
    }
    Ok(player
        .samples(kind)
        .map_or(StatisticalSummary::ZERO, collect))
}
