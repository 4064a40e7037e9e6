//! Deterministic throughput model used as the runner's simulation engine.
//!
//! Every variant draws from the same seeded stream, so differences between
//! profile sets come from their options alone.
use std::str::FromStr;

use profileset_engine::numbers::u64_to_f64;
use profileset_engine::{
    EquippedItem, GearSlot, MetricKind, PlayerReport, Race, RelicInfo, SampleData, SimConfig,
    SimOutcome, SimulationError, Simulator, TalentRef,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const DEFAULT_SEED: u64 = 0x5EED_CAFE;
const DEFAULT_BASE_DPS: f64 = 10_000.0;
const DEFAULT_VARIANCE: f64 = 0.05;
const DEFAULT_FIGHT_LENGTH: u64 = 300;

/// Throughput gained per rating point.
const RATING_WEIGHTS: [(&str, f64); 4] = [
    ("crit_rating", 0.000_09),
    ("haste_rating", 0.000_08),
    ("mastery_rating", 0.000_07),
    ("versatility_rating", 0.000_06),
];

/// Seeded engine reading throughput from rating options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticEngine;

impl Simulator for SyntheticEngine {
    fn simulate(&self, config: &SimConfig) -> Result<SimOutcome, SimulationError> {
        let model = Model::read(config)?;
        let mut rng = ChaCha8Rng::seed_from_u64(model.seed);

        let mut dps = SampleData::new();
        let mut hps = SampleData::new();
        let mut dtps = SampleData::new();
        let mut dmg_taken = SampleData::new();
        for _ in 0..model.iterations {
            let damage = model.damage_per_second * model.roll(&mut rng);
            let healing = model.healing_per_second * model.roll(&mut rng);
            let taken = model.damage_taken_per_second * model.roll(&mut rng);
            dps.add(damage);
            hps.add(healing);
            dtps.add(taken);
            dmg_taken.add(taken * model.fight_length);
        }
        let deaths: SampleData = std::iter::repeat_n(0.0, dps.len()).collect();

        let mut player = PlayerReport::new(config.get("name").unwrap_or("player"));
        player.race = read(config, "race")?.unwrap_or(Race::None);
        player.talents = parse_talents(config.get("talents").unwrap_or_default())?;
        player.artifact = config.get("artifact").unwrap_or_default().to_string();
        player.crucible = config.get("crucible").unwrap_or_default().to_string();
        player.gear = parse_gear(config)?;
        player.set_samples(MetricKind::Dpse, dps.clone());
        player.set_samples(MetricKind::Dps, dps);
        player.set_samples(MetricKind::Hpse, hps.clone());
        player.set_samples(MetricKind::Hps, hps);
        player.set_samples(MetricKind::Dtps, dtps);
        player.set_samples(MetricKind::DmgTaken, dmg_taken);
        player.set_samples(MetricKind::Deaths, deaths);

        let mut players = Vec::with_capacity(2);
        if let Some(pet) = config.get("pet").filter(|pet| !pet.is_empty()) {
            let mut companion = PlayerReport::new(pet);
            companion.owner = Some(player.name.clone());
            players.push(companion);
        }
        players.insert(0, player);
        Ok(SimOutcome::new(model.iterations, players))
    }
}

struct Model {
    iterations: u64,
    seed: u64,
    variance: f64,
    fight_length: f64,
    damage_per_second: f64,
    healing_per_second: f64,
    damage_taken_per_second: f64,
}

impl Model {
    fn read(config: &SimConfig) -> Result<Self, SimulationError> {
        let iterations = config.iterations().map_err(engine_error)?;
        let variance = read(config, "variance")?.unwrap_or(DEFAULT_VARIANCE);
        if !(0.0..1.0).contains(&variance) {
            return Err(SimulationError::new(format!(
                "variance must be in [0, 1), got {variance}"
            )));
        }
        let mut multiplier = 1.0;
        for (key, weight) in RATING_WEIGHTS {
            let rating: f64 = read(config, key)?.unwrap_or(0.0);
            multiplier += rating * weight;
        }
        let fight_length: u64 = read(config, "max_time")?.unwrap_or(DEFAULT_FIGHT_LENGTH);
        Ok(Self {
            iterations,
            seed: read(config, "seed")?.unwrap_or(DEFAULT_SEED),
            variance,
            fight_length: u64_to_f64(fight_length),
            damage_per_second: read(config, "base_dps")?.unwrap_or(DEFAULT_BASE_DPS)
                * multiplier.max(0.0),
            healing_per_second: read(config, "base_hps")?.unwrap_or(0.0),
            damage_taken_per_second: read(config, "base_dtps")?.unwrap_or(0.0),
        })
    }

    fn roll(&self, rng: &mut ChaCha8Rng) -> f64 {
        if self.variance > 0.0 {
            1.0 + rng.gen_range(-self.variance..self.variance)
        } else {
            1.0
        }
    }
}

fn engine_error(err: impl std::fmt::Display) -> SimulationError {
    SimulationError::new(err.to_string())
}

fn read<T: FromStr>(config: &SimConfig, key: &str) -> Result<Option<T>, SimulationError> {
    config.get_parsed(key).map_err(engine_error)
}

/// `tier:talent_id:name` entries, comma separated.
fn parse_talents(value: &str) -> Result<Vec<TalentRef>, SimulationError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let tier = parts.next().and_then(|t| t.parse().ok());
            let talent_id = parts.next().and_then(|t| t.parse().ok());
            let name = parts.next().filter(|n| !n.is_empty());
            match (tier, talent_id, name) {
                (Some(tier), Some(talent_id), Some(name)) => Ok(TalentRef {
                    tier,
                    talent_id,
                    name: name.to_string(),
                }),
                _ => Err(SimulationError::new(format!("malformed talent '{entry}'"))),
            }
        })
        .collect()
}

/// Items from `gear.<slot>=id=..,ilevel=..,bonus_id=a/b,enchant_id=..,gem_id=a/b,
/// relic_id=a:b/c,relic_ilevel=a/b,relic_bonus_ilevel=a/b` options.
fn parse_gear(config: &SimConfig) -> Result<Vec<EquippedItem>, SimulationError> {
    let mut gear = Vec::new();
    for (slot, value) in config.subtree("gear") {
        let slot = GearSlot::from_str(slot).map_err(engine_error)?;
        gear.push(parse_item(slot, value)?);
    }
    gear.sort_by_key(|item| item.slot);
    Ok(gear)
}

fn parse_item(slot: GearSlot, value: &str) -> Result<EquippedItem, SimulationError> {
    let mut item = EquippedItem::new(slot, 0, 0);
    let mut relic_levels: Vec<u32> = Vec::new();
    let mut relic_bonus_levels: Vec<u32> = Vec::new();
    for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (key, raw) = field
            .split_once('=')
            .ok_or_else(|| SimulationError::new(format!("gear.{slot}: malformed '{field}'")))?;
        match key {
            "id" => item.item_id = number(slot, key, raw)?,
            "ilevel" => item.item_level = number(slot, key, raw)?,
            "enchant_id" => item.enchant_id = number(slot, key, raw)?,
            "bonus_id" => item.bonus_ids = list(slot, key, raw, '/')?,
            "gem_id" => item.gem_ids = list(slot, key, raw, '/')?,
            "relic_id" => {
                item.relics = raw
                    .split('/')
                    .map(|relic| -> Result<RelicInfo, SimulationError> {
                        Ok(RelicInfo {
                            bonus_ids: list(slot, key, relic, ':')?,
                            ..RelicInfo::default()
                        })
                    })
                    .collect::<Result<_, _>>()?;
            }
            "relic_ilevel" => relic_levels = list(slot, key, raw, '/')?,
            "relic_bonus_ilevel" => relic_bonus_levels = list(slot, key, raw, '/')?,
            _ => {
                return Err(SimulationError::new(format!(
                    "gear.{slot}: unknown field '{key}'"
                )));
            }
        }
    }
    for (index, relic) in item.relics.iter_mut().enumerate() {
        relic.item_level = relic_levels.get(index).copied().unwrap_or(0);
        relic.bonus_item_level = relic_bonus_levels.get(index).copied().unwrap_or(0);
    }
    Ok(item)
}

fn number<T: FromStr>(slot: GearSlot, key: &str, raw: &str) -> Result<T, SimulationError> {
    raw.trim()
        .parse()
        .map_err(|_| SimulationError::new(format!("gear.{slot}: invalid {key} '{raw}'")))
}

fn list<T: FromStr>(
    slot: GearSlot,
    key: &str,
    raw: &str,
    separator: char,
) -> Result<Vec<T>, SimulationError> {
    raw.split(separator)
        .filter(|part| !part.trim().is_empty())
        .map(|part| number(slot, key, part))
        .collect()
}
