//! Profileset Engine
//!
//! Orchestrates batches of named variants ("profile sets") of a baseline
//! simulation configuration. Each variant overlays its own options on the
//! baseline, runs once through an external [`Simulator`], and is reduced to
//! seven-number summaries per tracked metric. Runs execute on the calling
//! thread or on one background worker, can be cancelled between variants, and
//! produce a deterministic ranking as JSON, text or chart rows.

pub mod control;
pub mod error;
pub mod metric;
pub mod numbers;
pub mod options;
pub mod orchestrator;
pub mod report;
pub mod sim;
pub mod snapshot;
pub mod stats;
pub mod variant;

// Re-export commonly used types
pub use control::{CancelHandle, Completion, Progress, RunState};
pub use error::ProfilesetError;
pub use metric::{MetricKind, MetricResult, metric_data};
pub use options::{
    DEFAULT_ITERATIONS, OptionEntry, OptionMode, OptionOverlay, ProfilesetSettings, SimConfig,
};
pub use orchestrator::{Orchestrator, ProfilesetDefinition};
pub use report::{
    ChartRow, MAX_CHART_ENTRIES, MetricEntry, MetricValues, ProfilesetReport, ReportEntry,
    generate_chart, generate_sorted_profilesets, max_name_length,
};
pub use sim::{EquippedItem, PlayerReport, RelicInfo, SimOutcome, SimulationError, Simulator};
pub use snapshot::{
    GearSlot, GearSlotSnapshot, GemSlot, MAX_GEM_SLOTS, OutputField, Race, TalentRef,
    VariantOutputSnapshot, save_output_data,
};
pub use stats::{SampleData, StatisticalSummary, collect};
pub use variant::ProfileVariant;
