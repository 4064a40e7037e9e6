//! Seam to the external simulation engine.
//!
//! The orchestrator never simulates anything itself; it hands each resolved
//! configuration to a [`Simulator`] and reads the returned actor reports.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metric::MetricKind;
use crate::options::SimConfig;
use crate::snapshot::{GearSlot, Race, TalentRef};
use crate::stats::SampleData;

/// Unrecoverable failure reported by a simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SimulationError {
    message: String,
}

impl SimulationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Engine able to run one complete simulation for a resolved configuration.
///
/// Implementations must be shareable with the background worker thread.
pub trait Simulator: Send + Sync {
    /// Run the simulation to completion.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine itself fails; the orchestrator treats
    /// this as fatal for the whole batch.
    fn simulate(&self, config: &SimConfig) -> Result<SimOutcome, SimulationError>;
}

impl<F> Simulator for F
where
    F: Fn(&SimConfig) -> Result<SimOutcome, SimulationError> + Send + Sync,
{
    fn simulate(&self, config: &SimConfig) -> Result<SimOutcome, SimulationError> {
        self(config)
    }
}

/// Relic bound to one socket of an equipped item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelicInfo {
    pub bonus_ids: Vec<u32>,
    pub item_level: u32,
    pub bonus_item_level: u32,
}

/// Item as equipped on a live simulated actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquippedItem {
    pub slot: GearSlot,
    pub item_id: u32,
    pub item_level: u32,
    #[serde(default)]
    pub bonus_ids: Vec<i32>,
    #[serde(default)]
    pub enchant_id: u32,
    #[serde(default)]
    pub gem_ids: Vec<i32>,
    #[serde(default)]
    pub relics: Vec<RelicInfo>,
}

impl EquippedItem {
    #[must_use]
    pub const fn new(slot: GearSlot, item_id: u32, item_level: u32) -> Self {
        Self {
            slot,
            item_id,
            item_level,
            bonus_ids: Vec::new(),
            enchant_id: 0,
            gem_ids: Vec::new(),
            relics: Vec::new(),
        }
    }
}

/// Final state of one simulated actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerReport {
    pub name: String,
    /// Name of the owning actor when this actor is a pet or other owned unit.
    pub owner: Option<String>,
    pub race: Race,
    pub talents: Vec<TalentRef>,
    pub artifact: String,
    pub crucible: String,
    pub gear: Vec<EquippedItem>,
    samples: BTreeMap<MetricKind, SampleData>,
}

impl PlayerReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_samples(mut self, kind: MetricKind, data: SampleData) -> Self {
        self.set_samples(kind, data);
        self
    }

    pub fn set_samples(&mut self, kind: MetricKind, data: SampleData) {
        self.samples.insert(kind, data);
    }

    #[must_use]
    pub fn samples(&self, kind: MetricKind) -> Option<&SampleData> {
        self.samples.get(&kind)
    }

    #[must_use]
    pub const fn is_pet(&self) -> bool {
        self.owner.is_some()
    }
}

/// Everything an engine reports back for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimOutcome {
    pub iterations: u64,
    pub players: Vec<PlayerReport>,
}

impl SimOutcome {
    #[must_use]
    pub const fn new(iterations: u64, players: Vec<PlayerReport>) -> Self {
        Self {
            iterations,
            players,
        }
    }

    /// The actor the run was aimed at: the first one reported.
    ///
    /// It may be a pet; its owner is then found through [`SimOutcome::parent_of`].
    #[must_use]
    pub fn target(&self) -> Option<&PlayerReport> {
        self.players.first()
    }

    /// The owner of `player` when it is a pet, otherwise `player` itself.
    #[must_use]
    pub fn parent_of<'a>(&'a self, player: &'a PlayerReport) -> &'a PlayerReport {
        player
            .owner
            .as_deref()
            .and_then(|owner| self.players.iter().find(|p| p.name == owner))
            .unwrap_or(player)
    }
}
