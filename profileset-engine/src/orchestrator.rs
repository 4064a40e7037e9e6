//! Orchestration of a batch of profile sets.
//!
//! The orchestrator owns the baseline configuration and the ordered variant
//! list. Execution claims variants one at a time through the shared
//! [`Control`] block, either on the calling thread or on a single background
//! worker. In background mode the worker takes ownership of the variant list
//! and hands it back on join, so only the executing thread ever writes results.
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::{CancelHandle, Completion, Control, Progress, RunState};
use crate::error::ProfilesetError;
use crate::metric::{MetricKind, MetricResult, metric_data};
use crate::options::{
    ACTOR_DEFINITION_KEYS, ACTOR_IDENTITY_KEYS, OUTPUT_DATA_KEY, OptionOverlay,
    ProfilesetSettings, SIM_SCOPE_KEYS, SimConfig,
};
use crate::sim::{SimulationError, Simulator};
use crate::snapshot::{OutputField, save_output_data};
use crate::variant::ProfileVariant;

const WORKER_THREAD_NAME: &str = "profileset-worker";

/// Raw definition of one profile set: its name and its option lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesetDefinition {
    pub name: String,
    pub options: Vec<String>,
}

impl ProfilesetDefinition {
    pub fn new<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

type WorkerResult = (Vec<ProfileVariant>, Result<Completion, ProfilesetError>);

/// Drives parse, initialize, iterate and output for a batch of profile sets.
#[derive(Debug)]
pub struct Orchestrator {
    original: SimConfig,
    settings: ProfilesetSettings,
    variants: Vec<ProfileVariant>,
    names: Vec<String>,
    insert_index: u64,
    control: Arc<Control>,
    worker: Option<JoinHandle<WorkerResult>>,
    completion: Option<Completion>,
}

impl Orchestrator {
    /// Create an orchestrator for `original`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the baseline's orchestration keys
    /// are invalid.
    pub fn new(original: SimConfig) -> Result<Self, ProfilesetError> {
        let settings = ProfilesetSettings::from_config(&original)?;
        Ok(Self {
            original,
            settings,
            variants: Vec::new(),
            names: Vec::new(),
            insert_index: 0,
            control: Control::new(),
            worker: None,
            completion: None,
        })
    }

    #[must_use]
    pub const fn original(&self) -> &SimConfig {
        &self.original
    }

    #[must_use]
    pub const fn settings(&self) -> &ProfilesetSettings {
        &self.settings
    }

    /// Metric that ranks the output.
    #[must_use]
    pub fn primary_metric(&self) -> MetricKind {
        self.settings.primary_metric()
    }

    /// Add one variant per definition, in input order.
    ///
    /// Either every definition is accepted or none is.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::EmptyName`], [`ProfilesetError::PaddedName`],
    /// [`ProfilesetError::DuplicateName`] or [`ProfilesetError::UnparseableOption`];
    /// [`ProfilesetError::InvalidState`]
    /// once initialization has begun.
    pub fn parse(&mut self, definitions: &[ProfilesetDefinition]) -> Result<usize, ProfilesetError> {
        if self.control.state() != RunState::Started {
            return Err(ProfilesetError::InvalidState {
                operation: "parse",
                detail: "after initialization has begun",
            });
        }

        let has_output = !self.settings.output_fields.is_empty();
        let mut staged: Vec<ProfileVariant> = Vec::with_capacity(definitions.len());
        let mut next_index = self.insert_index;
        for definition in definitions {
            let name = definition.name.as_str();
            if name.trim().is_empty() {
                return Err(ProfilesetError::EmptyName);
            }
            if name.trim() != name {
                return Err(ProfilesetError::PaddedName {
                    name: name.to_string(),
                });
            }
            let taken = self.names.iter().any(|existing| existing == name)
                || staged.iter().any(|variant| variant.name() == name);
            if taken {
                return Err(ProfilesetError::DuplicateName {
                    name: name.to_string(),
                });
            }
            let overlay = OptionOverlay::parse(&definition.options).map_err(|line| {
                ProfilesetError::UnparseableOption {
                    profileset: name.to_string(),
                    line,
                }
            })?;
            staged.push(ProfileVariant::new(name, next_index, overlay, has_output));
            next_index += 1;
        }

        let added = staged.len();
        self.insert_index = next_index;
        self.names.extend(staged.iter().map(|variant| variant.name().to_string()));
        self.variants.extend(staged);
        log::debug!("parsed {added} profilesets ({} total)", self.names.len());
        Ok(added)
    }

    /// Resolve every variant against the baseline and enter [`RunState::Running`].
    ///
    /// Validation runs for all variants before any of them is resolved; on
    /// failure no variant is touched and the batch ends in [`RunState::Done`].
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found, or
    /// [`ProfilesetError::InvalidState`] when called twice.
    pub fn initialize(&mut self) -> Result<Completion, ProfilesetError> {
        if !self.control.advance(RunState::Initializing) {
            return Err(ProfilesetError::InvalidState {
                operation: "initialize",
                detail: "more than once",
            });
        }
        self.finish_initialize()
    }

    fn finish_initialize(&mut self) -> Result<Completion, ProfilesetError> {
        let resolved = match self.resolve_all() {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Ok(self.end_without_running(Completion::Cancelled)),
            Err(err) => {
                log::warn!("profileset initialization failed: {err}");
                self.end_without_running(Completion::Failed);
                return Err(err);
            }
        };

        for (variant, (options, fields)) in self.variants.iter_mut().zip(resolved) {
            variant.resolve(options, fields);
        }
        self.control.advance(RunState::Running);
        log::info!(
            "initialized {} profilesets ranked by {}",
            self.variants.len(),
            self.primary_metric()
        );
        Ok(Completion::Finished)
    }

    /// Resolved configuration per variant, or `None` when cancelled midway.
    fn resolve_all(&self) -> Result<Option<Vec<(SimConfig, Vec<OutputField>)>>, ProfilesetError> {
        let mut resolved = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            if self.control.cancel_requested() {
                return Ok(None);
            }
            resolved.push(self.resolve(variant)?);
        }
        if self.control.cancel_requested() {
            return Ok(None);
        }
        Ok(Some(resolved))
    }

    fn resolve(
        &self,
        variant: &ProfileVariant,
    ) -> Result<(SimConfig, Vec<OutputField>), ProfilesetError> {
        let overlay = variant.overlay();
        let invalid = |key: &str, reason: &'static str| ProfilesetError::InvalidOption {
            profileset: variant.name().to_string(),
            key: key.to_string(),
            reason,
        };
        if let Some(entry) = overlay.keys_in(SIM_SCOPE_KEYS).next() {
            return Err(invalid(&entry.key, "applies to the whole batch"));
        }
        if let Some(entry) = overlay.keys_in(ACTOR_DEFINITION_KEYS).next() {
            return Err(invalid(&entry.key, "would add another actor"));
        }

        let options = self.original.layered(overlay);
        for key in ACTOR_IDENTITY_KEYS {
            if options.get(key) != self.original.get(key) {
                return Err(invalid(key, "must match the baseline actor"));
            }
        }
        let fields = options
            .get(OUTPUT_DATA_KEY)
            .map(OutputField::parse_list)
            .transpose()?
            .unwrap_or_default();
        Ok((options, fields))
    }

    fn end_without_running(&mut self, completion: Completion) -> Completion {
        self.control.abort();
        self.completion = Some(completion);
        completion
    }

    fn begin_run(&self, operation: &'static str) -> Result<(), ProfilesetError> {
        if self.worker.is_some() {
            return Err(ProfilesetError::InvalidState {
                operation,
                detail: "while a background run is active",
            });
        }
        if self.control.state() != RunState::Running || self.completion.is_some() {
            return Err(ProfilesetError::InvalidState {
                operation,
                detail: "unless the batch is initialized and not yet run",
            });
        }
        log::info!(
            "running {} profilesets at {} iterations",
            self.names.len(),
            self.original.iterations()?
        );
        self.control.begin_run(self.names.clone());
        Ok(())
    }

    /// Execute every variant on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::Simulation`] when the engine fails; the batch
    /// stops at the failing variant and ends in [`RunState::Done`].
    pub fn iterate(&mut self, simulator: &dyn Simulator) -> Result<Completion, ProfilesetError> {
        self.begin_run("iterate")?;
        let outcome = execute(
            &self.control,
            &mut self.variants,
            simulator,
            &self.settings.metrics,
        );
        self.settle(outcome)
    }

    /// Execute every variant on one background worker thread.
    ///
    /// Results become readable again after [`Orchestrator::wait`].
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::WorkerSpawn`] when the thread cannot start;
    /// the batch is then over and its variants are gone.
    pub fn iterate_background(
        &mut self,
        simulator: Arc<dyn Simulator>,
    ) -> Result<(), ProfilesetError> {
        self.begin_run("iterate_background")?;
        let mut variants = mem::take(&mut self.variants);
        let control = Arc::clone(&self.control);
        let metrics = self.settings.metrics.clone();
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = execute(&control, &mut variants, simulator.as_ref(), &metrics);
                let outcome = match outcome {
                    Ok(()) => Ok(control.finish_run()),
                    Err(err) => {
                        control.abort();
                        Err(err)
                    }
                };
                (variants, outcome)
            })
            .map_err(|err| {
                self.control.abort();
                ProfilesetError::WorkerSpawn(err)
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Join the background worker and take its variants back.
    ///
    /// After a synchronous run this returns the recorded completion, which is
    /// [`Completion::Failed`] when that run already returned an error.
    ///
    /// # Errors
    ///
    /// Returns the worker's error, [`ProfilesetError::WorkerPanicked`], or
    /// [`ProfilesetError::InvalidState`] when no run has happened.
    pub fn wait(&mut self) -> Result<Completion, ProfilesetError> {
        if let Some(handle) = self.worker.take() {
            let Ok((variants, outcome)) = handle.join() else {
                self.control.abort();
                self.completion = Some(Completion::Failed);
                return Err(ProfilesetError::WorkerPanicked);
            };
            self.variants = variants;
            return self.record(outcome);
        }
        self.completion.ok_or(ProfilesetError::InvalidState {
            operation: "wait",
            detail: "before a run has started",
        })
    }

    fn settle(&mut self, outcome: Result<(), ProfilesetError>) -> Result<Completion, ProfilesetError> {
        let outcome = match outcome {
            Ok(()) => Ok(self.control.finish_run()),
            Err(err) => {
                self.control.abort();
                Err(err)
            }
        };
        self.record(outcome)
    }

    fn record(
        &mut self,
        outcome: Result<Completion, ProfilesetError>,
    ) -> Result<Completion, ProfilesetError> {
        let progress = self.control.progress();
        match &outcome {
            Ok(completion) => {
                self.completion = Some(*completion);
                log::info!(
                    "profileset run {:?}: {} of {} variants completed",
                    completion,
                    progress.completed,
                    progress.total
                );
            }
            Err(err) => {
                self.completion = Some(Completion::Failed);
                log::warn!("profileset run failed: {err}");
            }
        }
        outcome
    }

    /// Request cancellation. At most the variant already claimed still runs.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.control))
    }

    /// Name of the variant most recently claimed for execution.
    #[must_use]
    pub fn current_profileset_name(&self) -> Option<String> {
        self.control.current_name()
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.control.progress()
    }

    /// Block until the run is over, or until `timeout` elapses.
    ///
    /// Returns whether [`RunState::Done`] was reached.
    #[must_use]
    pub fn wait_until_done(&self, timeout: Option<Duration>) -> bool {
        self.control.wait_until_done(timeout)
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.control.state()
    }

    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.state() == RunState::Initializing
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state() == RunState::Done
    }

    /// Outcome of the last run, once it has been observed.
    #[must_use]
    pub const fn completion(&self) -> Option<Completion> {
        self.completion
    }

    #[must_use]
    pub fn n_profilesets(&self) -> usize {
        self.names.len()
    }

    /// Variants in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::InvalidState`] while a background worker
    /// owns the variants.
    pub fn variants(&self) -> Result<&[ProfileVariant], ProfilesetError> {
        if self.worker.is_some() {
            return Err(ProfilesetError::InvalidState {
                operation: "reading profilesets",
                detail: "while a background run is active",
            });
        }
        Ok(self.variants.as_slice())
    }

    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&ProfileVariant> {
        self.variants().ok()?.iter().find(|variant| variant.name() == name)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            self.control.cancel();
            if handle.join().is_err() {
                log::warn!("profileset worker panicked during shutdown");
            }
        }
    }
}

fn execute(
    control: &Control,
    variants: &mut [ProfileVariant],
    simulator: &dyn Simulator,
    metrics: &[MetricKind],
) -> Result<(), ProfilesetError> {
    while let Some(index) = control.claim() {
        let Some(variant) = variants.get_mut(index) else {
            break;
        };
        log::debug!("simulating profileset '{}'", variant.name());
        run_variant(variant, simulator, metrics)?;
        control.mark_completed();
    }
    Ok(())
}

fn run_variant(
    variant: &mut ProfileVariant,
    simulator: &dyn Simulator,
    metrics: &[MetricKind],
) -> Result<(), ProfilesetError> {
    let failure = |variant: &ProfileVariant, source: SimulationError| ProfilesetError::Simulation {
        profileset: variant.name().to_string(),
        source,
    };
    let Some(options) = variant.options() else {
        return Err(ProfilesetError::InvalidState {
            operation: "simulating a profileset",
            detail: "before it is initialized",
        });
    };
    let outcome = simulator
        .simulate(options)
        .map_err(|source| failure(variant, source))?;
    let Some(player) = outcome.target() else {
        return Err(failure(
            variant,
            SimulationError::new("simulation reported no actors"),
        ));
    };

    variant.clear_run();
    for &kind in metrics {
        match metric_data(player, kind) {
            Ok(summary) => {
                variant.record_result(MetricResult::new(kind, summary, outcome.iterations));
            }
            Err(ProfilesetError::UnsupportedMetric { kind }) => {
                log::warn!(
                    "profileset '{}': metric '{kind}' is not supported",
                    variant.name()
                );
                variant.record_unsupported(kind);
            }
            Err(err) => return Err(err),
        }
    }
    if variant.has_output() {
        save_output_data(variant, outcome.parent_of(player), player);
    }
    Ok(())
}
