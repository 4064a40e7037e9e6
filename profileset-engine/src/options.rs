//! Option overlays and the baseline configuration they layer onto.
//!
//! Options are `key=value` (assign) or `key+=value` (append) lines. Keys are
//! dotted paths, so a configuration forms a tree addressed by prefix.
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProfilesetError;
use crate::metric::MetricKind;
use crate::snapshot::OutputField;

pub const ITERATIONS_KEY: &str = "iterations";
pub const METRIC_KEY: &str = "profileset_metric";
pub const OUTPUT_DATA_KEY: &str = "profileset_output_data";

pub const DEFAULT_ITERATIONS: u64 = 1000;

/// Options that must hold the same value for every variant of a batch.
pub const SIM_SCOPE_KEYS: &[&str] = &[
    ITERATIONS_KEY,
    "seed",
    "threads",
    "target_error",
    "max_time",
    "fight_style",
    "desired_targets",
    METRIC_KEY,
];

/// Options that would add actors to a variant's simulation.
pub const ACTOR_DEFINITION_KEYS: &[&str] = &["actor", "copy"];

/// Options a variant may repeat but not change.
pub const ACTOR_IDENTITY_KEYS: &[&str] = &["class", "spec"];

fn option_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*(\+?=)\s*(.*)$").ok()
        })
        .as_ref()
}

/// How an option line combines with an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionMode {
    Assign,
    Append,
}

/// A single parsed option line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub key: String,
    pub value: String,
    pub mode: OptionMode,
}

impl OptionEntry {
    /// Parse one option line, returning `None` for lines outside the grammar.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let captures = option_pattern()?.captures(line.trim())?;
        let mode = if captures.get(2)?.as_str() == "+=" {
            OptionMode::Append
        } else {
            OptionMode::Assign
        };
        Some(Self {
            key: captures.get(1)?.as_str().to_string(),
            value: captures.get(3)?.as_str().trim_end().to_string(),
            mode,
        })
    }
}

/// Ordered overrides owned by one profile set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionOverlay {
    entries: Vec<OptionEntry>,
}

impl OptionOverlay {
    /// Parse option lines, skipping blanks and `#` comments.
    ///
    /// # Errors
    ///
    /// Returns the first line that does not fit the option grammar.
    pub fn parse<I, S>(lines: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries = Vec::new();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = OptionEntry::parse(line).ok_or_else(|| line.to_string())?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[OptionEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of this overlay whose key appears in `keys`.
    pub fn keys_in<'a>(
        &'a self,
        keys: &'a [&'static str],
    ) -> impl Iterator<Item = &'a OptionEntry> {
        self.entries
            .iter()
            .filter(move |entry| keys.iter().any(|key| *key == entry.key))
    }
}

/// Baseline or fully resolved configuration of one simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    values: BTreeMap<String, String>,
}

impl SimConfig {
    /// Build a configuration from option lines.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::UnparseableOption`] naming the offending line.
    pub fn parse<I, S>(lines: I) -> Result<Self, ProfilesetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let overlay =
            OptionOverlay::parse(lines).map_err(|line| ProfilesetError::UnparseableOption {
                profileset: String::from("baseline"),
                line,
            })?;
        let mut config = Self::default();
        config.apply(&overlay);
        Ok(config)
    }

    /// Layer `overlay` onto this configuration in entry order.
    pub fn apply(&mut self, overlay: &OptionOverlay) {
        for entry in overlay.entries() {
            match entry.mode {
                OptionMode::Assign => {
                    self.values.insert(entry.key.clone(), entry.value.clone());
                }
                OptionMode::Append => {
                    self.values
                        .entry(entry.key.clone())
                        .or_default()
                        .push_str(&entry.value);
                }
            }
        }
    }

    /// Clone of this configuration with `overlay` applied.
    #[must_use]
    pub fn layered(&self, overlay: &OptionOverlay) -> Self {
        let mut config = self.clone();
        config.apply(overlay);
        config
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Typed read of an option.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::InvalidValue`] when the value does not parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ProfilesetError> {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| ProfilesetError::InvalidValue {
                        key: key.to_string(),
                        value: raw.to_string(),
                    })
            })
            .transpose()
    }

    /// Iteration count for every simulation of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::InvalidValue`] for a non-numeric or zero count.
    pub fn iterations(&self) -> Result<u64, ProfilesetError> {
        match self.get_parsed::<u64>(ITERATIONS_KEY)? {
            Some(0) => Err(ProfilesetError::InvalidValue {
                key: ITERATIONS_KEY.to_string(),
                value: "0".to_string(),
            }),
            Some(iterations) => Ok(iterations),
            None => Ok(DEFAULT_ITERATIONS),
        }
    }

    /// Entries below `prefix.`, with the prefix stripped.
    pub fn subtree<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values.iter().filter_map(move |(key, value)| {
            key.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(|child| (child, value.as_str()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Orchestration settings read from the baseline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilesetSettings {
    /// Tracked metrics; the first one ranks the output.
    pub metrics: Vec<MetricKind>,
    /// Snapshot fields requested by the baseline.
    pub output_fields: Vec<OutputField>,
}

impl Default for ProfilesetSettings {
    fn default() -> Self {
        Self {
            metrics: vec![MetricKind::Dps],
            output_fields: Vec::new(),
        }
    }
}

impl ProfilesetSettings {
    /// Read settings from a baseline configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown metric or output field names
    /// and for an invalid iteration count.
    pub fn from_config(config: &SimConfig) -> Result<Self, ProfilesetError> {
        config.iterations()?;
        let mut metrics = Vec::new();
        if let Some(raw) = config.get(METRIC_KEY) {
            for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                let kind = token.parse::<MetricKind>()?;
                if !metrics.contains(&kind) {
                    metrics.push(kind);
                }
            }
        }
        if metrics.is_empty() {
            metrics.push(MetricKind::Dps);
        }
        let output_fields = config
            .get(OUTPUT_DATA_KEY)
            .map(OutputField::parse_list)
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            metrics,
            output_fields,
        })
    }

    #[must_use]
    pub fn primary_metric(&self) -> MetricKind {
        self.metrics.first().copied().unwrap_or(MetricKind::Dps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_parse_assign_and_append() {
        let entry = OptionEntry::parse("gear.head = id=1234,ilevel=415").unwrap();
        assert_eq!(entry.key, "gear.head");
        assert_eq!(entry.value, "id=1234,ilevel=415");
        assert_eq!(entry.mode, OptionMode::Assign);

        let append = OptionEntry::parse("actions+=/auto_attack").unwrap();
        assert_eq!(append.mode, OptionMode::Append);
        assert_eq!(append.value, "/auto_attack");
    }

    #[test]
    fn lines_outside_grammar_are_rejected() {
        assert!(OptionEntry::parse("no equals here").is_none());
        assert!(OptionEntry::parse("=value").is_none());
        assert!(OptionEntry::parse("1key=value").is_none());
        assert_eq!(
            OptionOverlay::parse(["crit_rating=10", "oops"]).unwrap_err(),
            "oops"
        );
    }

    #[test]
    fn overlay_skips_comments_and_blanks() {
        let overlay = OptionOverlay::parse(["# comment", "", "  haste_rating=5 "]).unwrap();
        assert_eq!(overlay.entries().len(), 1);
    }

    #[test]
    fn layering_does_not_touch_baseline() {
        let baseline = SimConfig::parse(["crit_rating=100", "actions=/a"]).unwrap();
        let overlay = OptionOverlay::parse(["crit_rating=200", "actions+=/b"]).unwrap();
        let resolved = baseline.layered(&overlay);
        assert_eq!(resolved.get("crit_rating"), Some("200"));
        assert_eq!(resolved.get("actions"), Some("/a/b"));
        assert_eq!(baseline.get("crit_rating"), Some("100"));
    }

    #[test]
    fn subtree_selects_children() {
        let config = SimConfig::parse([
            "gear.head=id=1",
            "gear.neck=id=2",
            "gearbox=3",
            "talents=x",
        ])
        .unwrap();
        let children: Vec<_> = config.subtree("gear").map(|(k, _)| k).collect();
        assert_eq!(children, vec!["head", "neck"]);
    }

    #[test]
    fn iterations_default_and_validate() {
        assert_eq!(SimConfig::default().iterations().unwrap(), DEFAULT_ITERATIONS);
        let config = SimConfig::parse(["iterations=250"]).unwrap();
        assert_eq!(config.iterations().unwrap(), 250);
        assert!(SimConfig::parse(["iterations=lots"]).unwrap().iterations().is_err());
        assert!(SimConfig::parse(["iterations=0"]).unwrap().iterations().is_err());
    }

    #[test]
    fn settings_read_metrics_and_output_fields() {
        let config =
            SimConfig::parse(["profileset_metric=dps, dtps,dps", "profileset_output_data=race"])
                .unwrap();
        let settings = ProfilesetSettings::from_config(&config).unwrap();
        assert_eq!(settings.metrics, vec![MetricKind::Dps, MetricKind::Dtps]);
        assert_eq!(settings.primary_metric(), MetricKind::Dps);
        assert_eq!(settings.output_fields, vec![OutputField::Race]);

        let bad = SimConfig::parse(["profileset_metric=speed"]).unwrap();
        assert!(matches!(
            ProfilesetSettings::from_config(&bad),
            Err(ProfilesetError::UnknownMetric { .. })
        ));
    }
}
