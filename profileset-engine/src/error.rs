//! Error taxonomy for profile set orchestration.
use thiserror::Error;

use crate::metric::MetricKind;
use crate::sim::SimulationError;

/// Errors raised while parsing, validating, running or reporting profile sets.
///
/// Cancellation is not represented here; lifecycle operations report it through
/// [`crate::Completion::Cancelled`].
#[derive(Debug, Error)]
pub enum ProfilesetError {
    #[error("profileset name must not be empty")]
    EmptyName,
    #[error("profileset name '{name}' has leading or trailing whitespace")]
    PaddedName { name: String },
    #[error("profileset '{name}' is defined more than once")]
    DuplicateName { name: String },
    #[error("profileset '{profileset}': cannot parse option '{line}'")]
    UnparseableOption { profileset: String, line: String },
    #[error("profileset '{profileset}': option '{key}' {reason}")]
    InvalidOption {
        profileset: String,
        key: String,
        reason: &'static str,
    },
    #[error("option '{key}' has invalid value '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("unknown metric '{name}'")]
    UnknownMetric { name: String },
    #[error("metric '{kind}' cannot be computed for a profileset")]
    UnsupportedMetric { kind: MetricKind },
    #[error("{operation} is not allowed {detail}")]
    InvalidState {
        operation: &'static str,
        detail: &'static str,
    },
    #[error("simulation of profileset '{profileset}' failed")]
    Simulation {
        profileset: String,
        #[source]
        source: SimulationError,
    },
    #[error("failed to start profileset worker thread")]
    WorkerSpawn(#[source] std::io::Error),
    #[error("profileset worker thread panicked")]
    WorkerPanicked,
    #[error("failed to write profileset output")]
    Output(#[from] std::io::Error),
}

impl ProfilesetError {
    /// True for errors detected before any simulation work is spent.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyName
                | Self::PaddedName { .. }
                | Self::DuplicateName { .. }
                | Self::UnparseableOption { .. }
                | Self::InvalidOption { .. }
                | Self::InvalidValue { .. }
                | Self::UnknownMetric { .. }
        )
    }
}
