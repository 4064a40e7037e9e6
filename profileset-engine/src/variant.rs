//! A single profile set: a named overlay and everything its run produced.
use std::collections::BTreeMap;

use crate::metric::{MetricKind, MetricResult};
use crate::options::{OptionOverlay, SimConfig};
use crate::snapshot::{OutputField, VariantOutputSnapshot};

/// Named configuration overlay evaluated independently of its siblings.
#[derive(Debug, Clone)]
pub struct ProfileVariant {
    name: String,
    insertion_index: u64,
    overlay: OptionOverlay,
    options: Option<SimConfig>,
    has_output: bool,
    output_fields: Vec<OutputField>,
    results: BTreeMap<MetricKind, MetricResult>,
    unsupported: Vec<MetricKind>,
    output_data: Option<Box<VariantOutputSnapshot>>,
}

impl ProfileVariant {
    pub fn new(
        name: impl Into<String>,
        insertion_index: u64,
        overlay: OptionOverlay,
        has_output: bool,
    ) -> Self {
        Self {
            name: name.into(),
            insertion_index,
            overlay,
            options: None,
            has_output,
            output_fields: Vec::new(),
            results: BTreeMap::new(),
            unsupported: Vec::new(),
            output_data: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this variant in the input; the ranking tie-break.
    #[must_use]
    pub const fn insertion_index(&self) -> u64 {
        self.insertion_index
    }

    #[must_use]
    pub const fn overlay(&self) -> &OptionOverlay {
        &self.overlay
    }

    /// Fully resolved configuration, available once the batch is initialized.
    #[must_use]
    pub const fn options(&self) -> Option<&SimConfig> {
        self.options.as_ref()
    }

    #[must_use]
    pub const fn has_output(&self) -> bool {
        self.has_output
    }

    #[must_use]
    pub fn output_fields(&self) -> &[OutputField] {
        &self.output_fields
    }

    pub fn set_output_fields(&mut self, fields: Vec<OutputField>) {
        self.output_fields = fields;
    }

    /// Result for `kind`, or [`MetricResult::PLACEHOLDER`] when none was produced.
    #[must_use]
    pub fn result(&self, kind: MetricKind) -> &MetricResult {
        self.results.get(&kind).unwrap_or(&MetricResult::PLACEHOLDER)
    }

    #[must_use]
    pub fn has_result(&self, kind: MetricKind) -> bool {
        self.results.contains_key(&kind)
    }

    pub fn results(&self) -> impl Iterator<Item = &MetricResult> {
        self.results.values()
    }

    /// Store `result` under its own kind, replacing any earlier value.
    pub fn record_result(&mut self, result: MetricResult) {
        self.results.insert(result.kind(), result);
    }

    pub fn record_unsupported(&mut self, kind: MetricKind) {
        if !self.unsupported.contains(&kind) {
            self.unsupported.push(kind);
        }
    }

    /// Tracked metrics that could not be computed for this variant.
    #[must_use]
    pub fn unsupported(&self) -> &[MetricKind] {
        &self.unsupported
    }

    /// Mutable snapshot storage, allocating an empty snapshot on first access.
    pub fn output_data(&mut self) -> &mut VariantOutputSnapshot {
        self.output_data.get_or_insert_with(Box::default)
    }

    /// Captured snapshot, without allocating.
    #[must_use]
    pub fn snapshot(&self) -> Option<&VariantOutputSnapshot> {
        self.output_data.as_deref()
    }

    pub(crate) fn resolve(&mut self, options: SimConfig, output_fields: Vec<OutputField>) {
        self.has_output = !output_fields.is_empty();
        self.output_fields = output_fields;
        self.options = Some(options);
    }

    pub(crate) fn clear_run(&mut self) {
        self.results.clear();
        self.unsupported.clear();
        self.output_data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatisticalSummary;

    fn variant(has_output: bool) -> ProfileVariant {
        let overlay = OptionOverlay::parse(["crit_rating=200"]).unwrap();
        ProfileVariant::new("reforge_crit", 3, overlay, has_output)
    }

    #[test]
    fn absent_results_read_as_placeholder() {
        let variant = variant(false);
        assert!(!variant.has_result(MetricKind::Dps));
        assert_eq!(*variant.result(MetricKind::Dps), MetricResult::PLACEHOLDER);
    }

    #[test]
    fn recorded_results_are_keyed_by_kind() {
        let mut variant = variant(false);
        let summary = StatisticalSummary::uniform(5.0);
        variant.record_result(MetricResult::new(MetricKind::Dps, summary, 10));
        variant.record_result(MetricResult::new(MetricKind::Dps, summary, 20));
        assert_eq!(variant.results().count(), 1);
        assert_eq!(variant.result(MetricKind::Dps).iterations(), 20);
    }

    #[test]
    fn output_data_is_allocated_lazily() {
        let mut variant = variant(false);
        assert!(variant.snapshot().is_none());
        let snapshot = variant.output_data();
        assert_eq!(*snapshot, VariantOutputSnapshot::default());
        assert!(variant.snapshot().is_some());
    }

    #[test]
    fn resolve_derives_has_output_from_fields() {
        let mut variant = variant(true);
        variant.resolve(SimConfig::default(), Vec::new());
        assert!(!variant.has_output());
        variant.resolve(SimConfig::default(), vec![OutputField::Gear]);
        assert!(variant.has_output());
        assert!(variant.options().is_some());
        assert_eq!(variant.insertion_index(), 3);
    }

    #[test]
    fn unsupported_kinds_are_recorded_once() {
        let mut variant = variant(false);
        variant.record_unsupported(MetricKind::Haps);
        variant.record_unsupported(MetricKind::Haps);
        assert_eq!(variant.unsupported(), &[MetricKind::Haps]);
    }
}
