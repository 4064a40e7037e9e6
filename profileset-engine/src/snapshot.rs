//! Descriptive gear and talent snapshots captured per profile set.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::ProfilesetError;
use crate::sim::{EquippedItem, PlayerReport};
use crate::variant::ProfileVariant;

/// Number of sockets tracked per item.
pub const MAX_GEM_SLOTS: usize = 4;

/// Playable race of a simulated actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Race {
    #[default]
    None,
    Human,
    Orc,
    Dwarf,
    NightElf,
    Undead,
    Tauren,
    Gnome,
    Troll,
    Goblin,
    BloodElf,
    Draenei,
    Worgen,
    Pandaren,
    VoidElf,
    LightforgedDraenei,
    HighmountainTauren,
    Nightborne,
    DarkIronDwarf,
    MagharOrc,
    ZandalariTroll,
    KulTiran,
    Vulpera,
    Mechagnome,
    Dracthyr,
}

impl Race {
    pub const ALL: [Self; 25] = [
        Self::None,
        Self::Human,
        Self::Orc,
        Self::Dwarf,
        Self::NightElf,
        Self::Undead,
        Self::Tauren,
        Self::Gnome,
        Self::Troll,
        Self::Goblin,
        Self::BloodElf,
        Self::Draenei,
        Self::Worgen,
        Self::Pandaren,
        Self::VoidElf,
        Self::LightforgedDraenei,
        Self::HighmountainTauren,
        Self::Nightborne,
        Self::DarkIronDwarf,
        Self::MagharOrc,
        Self::ZandalariTroll,
        Self::KulTiran,
        Self::Vulpera,
        Self::Mechagnome,
        Self::Dracthyr,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Human => "human",
            Self::Orc => "orc",
            Self::Dwarf => "dwarf",
            Self::NightElf => "night_elf",
            Self::Undead => "undead",
            Self::Tauren => "tauren",
            Self::Gnome => "gnome",
            Self::Troll => "troll",
            Self::Goblin => "goblin",
            Self::BloodElf => "blood_elf",
            Self::Draenei => "draenei",
            Self::Worgen => "worgen",
            Self::Pandaren => "pandaren",
            Self::VoidElf => "void_elf",
            Self::LightforgedDraenei => "lightforged_draenei",
            Self::HighmountainTauren => "highmountain_tauren",
            Self::Nightborne => "nightborne",
            Self::DarkIronDwarf => "dark_iron_dwarf",
            Self::MagharOrc => "maghar_orc",
            Self::ZandalariTroll => "zandalari_troll",
            Self::KulTiran => "kul_tiran",
            Self::Vulpera => "vulpera",
            Self::Mechagnome => "mechagnome",
            Self::Dracthyr => "dracthyr",
        }
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Race {
    type Err = ProfilesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|race| race.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProfilesetError::InvalidValue {
                key: "race".to_string(),
                value: s.to_string(),
            })
    }
}

/// Equipment slot an item occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearSlot {
    Head,
    Neck,
    Shoulders,
    Shirt,
    Chest,
    Waist,
    Legs,
    Feet,
    Wrists,
    Hands,
    Finger1,
    Finger2,
    Trinket1,
    Trinket2,
    Back,
    MainHand,
    OffHand,
    Tabard,
}

impl GearSlot {
    pub const ALL: [Self; 18] = [
        Self::Head,
        Self::Neck,
        Self::Shoulders,
        Self::Shirt,
        Self::Chest,
        Self::Waist,
        Self::Legs,
        Self::Feet,
        Self::Wrists,
        Self::Hands,
        Self::Finger1,
        Self::Finger2,
        Self::Trinket1,
        Self::Trinket2,
        Self::Back,
        Self::MainHand,
        Self::OffHand,
        Self::Tabard,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Neck => "neck",
            Self::Shoulders => "shoulders",
            Self::Shirt => "shirt",
            Self::Chest => "chest",
            Self::Waist => "waist",
            Self::Legs => "legs",
            Self::Feet => "feet",
            Self::Wrists => "wrists",
            Self::Hands => "hands",
            Self::Finger1 => "finger1",
            Self::Finger2 => "finger2",
            Self::Trinket1 => "trinket1",
            Self::Trinket2 => "trinket2",
            Self::Back => "back",
            Self::MainHand => "main_hand",
            Self::OffHand => "off_hand",
            Self::Tabard => "tabard",
        }
    }
}

impl fmt::Display for GearSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GearSlot {
    type Err = ProfilesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProfilesetError::InvalidValue {
                key: "gear slot".to_string(),
                value: s.to_string(),
            })
    }
}

/// Resolved talent selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalentRef {
    pub tier: u32,
    pub talent_id: u32,
    pub name: String,
}

/// One socket of an item: the gem and the relic data bound to the same index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemSlot {
    pub gem_id: i32,
    pub relic_bonus_ids: SmallVec<[u32; 4]>,
    pub relic_item_level: u32,
    pub relic_bonus_item_level: u32,
}

impl GemSlot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gem_id == 0
            && self.relic_bonus_ids.is_empty()
            && self.relic_item_level == 0
            && self.relic_bonus_item_level == 0
    }
}

/// Gear descriptor for one equipped slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearSlotSnapshot {
    pub slot: GearSlot,
    pub item_id: u32,
    pub item_level: u32,
    pub bonus_ids: SmallVec<[i32; 8]>,
    pub enchant_id: u32,
    pub sockets: [GemSlot; MAX_GEM_SLOTS],
}

impl GearSlotSnapshot {
    /// Copy an equipped item into the fixed socket layout.
    ///
    /// Gems and relics beyond [`MAX_GEM_SLOTS`] are dropped.
    #[must_use]
    pub fn from_item(item: &EquippedItem) -> Self {
        let mut sockets: [GemSlot; MAX_GEM_SLOTS] = Default::default();
        for (index, socket) in sockets.iter_mut().enumerate() {
            if let Some(&gem_id) = item.gem_ids.get(index) {
                socket.gem_id = gem_id;
            }
            if let Some(relic) = item.relics.get(index) {
                socket.relic_bonus_ids = relic.bonus_ids.iter().copied().collect();
                socket.relic_item_level = relic.item_level;
                socket.relic_bonus_item_level = relic.bonus_item_level;
            }
        }
        Self {
            slot: item.slot,
            item_id: item.item_id,
            item_level: item.item_level,
            bonus_ids: item.bonus_ids.iter().copied().collect(),
            enchant_id: item.enchant_id,
            sockets,
        }
    }
}

/// Selectable parts of a [`VariantOutputSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    Race,
    Talents,
    Artifact,
    Crucible,
    Gear,
}

impl OutputField {
    /// Parse a comma separated field list, ignoring blanks and repeats.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::InvalidValue`] for an unknown field name.
    pub fn parse_list(value: &str) -> Result<Vec<Self>, ProfilesetError> {
        let mut fields = Vec::new();
        for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let field = token.parse::<Self>()?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    }
}

impl FromStr for OutputField {
    type Err = ProfilesetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "race" => Ok(Self::Race),
            "talent" | "talents" => Ok(Self::Talents),
            "artifact" => Ok(Self::Artifact),
            "crucible" => Ok(Self::Crucible),
            "gear" => Ok(Self::Gear),
            _ => Err(ProfilesetError::InvalidValue {
                key: crate::options::OUTPUT_DATA_KEY.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Deep copy of a variant's resolved descriptive state, for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOutputSnapshot {
    pub race: Race,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub talents: Vec<TalentRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crucible: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gear: Vec<GearSlotSnapshot>,
}

impl VariantOutputSnapshot {
    /// Capture the requested fields from `source`.
    #[must_use]
    pub fn capture(source: &PlayerReport, fields: &[OutputField]) -> Self {
        let mut snapshot = Self::default();
        for field in fields {
            match field {
                OutputField::Race => snapshot.race = source.race,
                OutputField::Talents => snapshot.talents.clone_from(&source.talents),
                OutputField::Artifact => snapshot.artifact.clone_from(&source.artifact),
                OutputField::Crucible => snapshot.crucible.clone_from(&source.crucible),
                OutputField::Gear => {
                    snapshot.gear = source
                        .gear
                        .iter()
                        .filter(|item| item.item_id != 0)
                        .map(GearSlotSnapshot::from_item)
                        .collect();
                }
            }
        }
        snapshot
    }
}

/// Store a fresh snapshot of `player` into `variant`, replacing any previous one.
///
/// When `player` is an owned unit its descriptive state belongs to `parent`,
/// so the snapshot is taken from the parent instead.
pub fn save_output_data(variant: &mut ProfileVariant, parent: &PlayerReport, player: &PlayerReport) {
    let source = if player.is_pet() { parent } else { player };
    let snapshot = VariantOutputSnapshot::capture(source, variant.output_fields());
    *variant.output_data() = snapshot;
}
