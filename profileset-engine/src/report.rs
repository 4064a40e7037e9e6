//! Ranked output of a completed batch: JSON document, text table and chart rows.
//!
//! Every emitter walks the same sorted sequence produced by
//! [`generate_sorted_profilesets`] and the same [`ReportEntry`] field set.
use std::cmp::Ordering;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::control::Completion;
use crate::error::ProfilesetError;
use crate::metric::{MetricKind, MetricResult};
use crate::orchestrator::Orchestrator;
use crate::snapshot::{GearSlotSnapshot, VariantOutputSnapshot};
use crate::variant::ProfileVariant;

/// Upper bound on emitted chart rows.
pub const MAX_CHART_ENTRIES: usize = 500;

/// Variants ordered by `metric` mean, highest first.
///
/// Equal means keep insertion order, so the ordering never depends on names.
#[must_use]
pub fn generate_sorted_profilesets(
    variants: &[ProfileVariant],
    metric: MetricKind,
) -> Vec<&ProfileVariant> {
    let mut sorted: Vec<&ProfileVariant> = variants.iter().collect();
    sorted.sort_by(|a, b| compare_ranked(a, b, metric));
    sorted
}

fn compare_ranked(a: &ProfileVariant, b: &ProfileVariant, metric: MetricKind) -> Ordering {
    b.result(metric)
        .mean()
        .total_cmp(&a.result(metric).mean())
        .then_with(|| a.insertion_index().cmp(&b.insertion_index()))
}

/// Longest of `names`, in characters. Text columns are padded to it.
#[must_use]
pub fn max_name_length<'a>(names: impl IntoIterator<Item = &'a str>) -> usize {
    names
        .into_iter()
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0)
}

/// Chart rows for the top [`MAX_CHART_ENTRIES`] entries of `sorted`.
#[must_use]
pub fn generate_chart(sorted: &[&ProfileVariant], metric: MetricKind) -> Vec<ChartRow> {
    sorted
        .iter()
        .take(MAX_CHART_ENTRIES)
        .enumerate()
        .map(|(index, variant)| {
            let summary = variant.result(metric).summary();
            ChartRow {
                rank: index + 1,
                name: variant.name().to_string(),
                mean: summary.mean,
                min: summary.min,
                first_quartile: summary.first_quartile,
                median: summary.median,
                third_quartile: summary.third_quartile,
                max: summary.max,
            }
        })
        .collect()
}

/// Box-plot row for one ranked variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub rank: usize,
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub first_quartile: f64,
    pub median: f64,
    pub third_quartile: f64,
    pub max: f64,
}

/// Flattened summary of one metric result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub first_quartile: f64,
    pub third_quartile: f64,
    pub stddev: f64,
    pub iterations: u64,
}

impl From<&MetricResult> for MetricValues {
    fn from(result: &MetricResult) -> Self {
        let summary = result.summary();
        Self {
            mean: summary.mean,
            median: summary.median,
            min: summary.min,
            max: summary.max,
            first_quartile: summary.first_quartile,
            third_quartile: summary.third_quartile,
            stddev: summary.std_dev,
            iterations: result.iterations(),
        }
    }
}

/// Non-ranking metric attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub metric: MetricKind,
    #[serde(flatten)]
    pub values: MetricValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub rank: usize,
    pub name: String,
    #[serde(flatten)]
    pub values: MetricValues,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_metrics: Vec<MetricEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_metrics: Vec<MetricKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<VariantOutputSnapshot>,
}

impl ReportEntry {
    fn build(rank: usize, variant: &ProfileVariant, metrics: &[MetricKind]) -> Self {
        let primary = metrics.first().copied().unwrap_or_default();
        let others = metrics.get(1..).unwrap_or_default();
        let additional_metrics = others
            .iter()
            .filter(|kind| variant.has_result(**kind))
            .map(|kind| MetricEntry {
                metric: *kind,
                values: MetricValues::from(variant.result(*kind)),
            })
            .collect();
        Self {
            rank,
            name: variant.name().to_string(),
            values: MetricValues::from(variant.result(primary)),
            additional_metrics,
            unsupported_metrics: variant.unsupported().to_vec(),
            overrides: variant.snapshot().cloned(),
        }
    }
}

/// Structured output document for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilesetReport {
    pub metric: MetricKind,
    #[serde(default)]
    pub cancelled: bool,
    /// The run stopped on an error; `results` hold what finished before it.
    #[serde(default)]
    pub failed: bool,
    pub results: Vec<ReportEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chart: Vec<ChartRow>,
}

impl ProfilesetReport {
    /// Rank `variants` by the first of `metrics`.
    #[must_use]
    pub fn build(variants: &[ProfileVariant], metrics: &[MetricKind]) -> Self {
        let metric = metrics.first().copied().unwrap_or(MetricKind::None);
        let results = generate_sorted_profilesets(variants, metric)
            .into_iter()
            .enumerate()
            .map(|(index, variant)| ReportEntry::build(index + 1, variant, metrics))
            .collect();
        Self {
            metric,
            cancelled: false,
            failed: false,
            results,
            chart: Vec::new(),
        }
    }

    /// Attach chart rows for the same ranking.
    #[must_use]
    pub fn with_chart(mut self, variants: &[ProfileVariant]) -> Self {
        let sorted = generate_sorted_profilesets(variants, self.metric);
        self.chart = generate_chart(&sorted, self.metric);
        self
    }

    /// Entry names in rank order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|entry| entry.name.as_str())
    }

    /// Write the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Propagates serialization and I/O errors.
    pub fn write_json<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)
    }

    /// Write the document as an aligned text table.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn write_text<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let width = max_name_length(self.names());
        let status = if self.failed {
            ", failed"
        } else if self.cancelled {
            ", cancelled"
        } else {
            ""
        };
        writeln!(
            writer,
            "Profilesets ranked by {} ({} entries{status})",
            self.metric,
            self.results.len()
        )?;
        for entry in &self.results {
            writeln!(
                writer,
                "{:>4}. {:<width$}  {}",
                entry.rank,
                entry.name,
                format_values(&entry.values)
            )?;
            for extra in &entry.additional_metrics {
                writeln!(
                    writer,
                    "      {:<width$}  {}: {}",
                    "",
                    extra.metric,
                    format_values(&extra.values)
                )?;
            }
            if !entry.unsupported_metrics.is_empty() {
                let names: Vec<&str> = entry
                    .unsupported_metrics
                    .iter()
                    .map(|kind| kind.label())
                    .collect();
                writeln!(writer, "      {:<width$}  unsupported: {}", "", names.join(", "))?;
            }
            if let Some(overrides) = &entry.overrides {
                write_overrides(writer, overrides, width)?;
            }
        }
        Ok(())
    }

    /// Write the chart rows as CSV.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn write_chart_csv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "rank,name,mean,min,first_quartile,median,third_quartile,max"
        )?;
        for row in &self.chart {
            writeln!(
                writer,
                "{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3}",
                row.rank,
                csv_field(&row.name),
                row.mean,
                row.min,
                row.first_quartile,
                row.median,
                row.third_quartile,
                row.max
            )?;
        }
        Ok(())
    }
}

fn format_values(values: &MetricValues) -> String {
    format!(
        "mean {:.2}  median {:.2}  min {:.2}  max {:.2}  q1 {:.2}  q3 {:.2}  stddev {:.2}  iterations {}",
        values.mean,
        values.median,
        values.min,
        values.max,
        values.first_quartile,
        values.third_quartile,
        values.stddev,
        values.iterations
    )
}

fn write_overrides<W: Write>(
    writer: &mut W,
    overrides: &VariantOutputSnapshot,
    width: usize,
) -> io::Result<()> {
    let pad = "";
    writeln!(writer, "      {pad:<width$}  race: {}", overrides.race)?;
    if !overrides.talents.is_empty() {
        let talents: Vec<String> = overrides
            .talents
            .iter()
            .map(|talent| format!("{}:{}({})", talent.tier, talent.name, talent.talent_id))
            .collect();
        writeln!(writer, "      {pad:<width$}  talents: {}", talents.join(" "))?;
    }
    if !overrides.artifact.is_empty() {
        writeln!(writer, "      {pad:<width$}  artifact: {}", overrides.artifact)?;
    }
    if !overrides.crucible.is_empty() {
        writeln!(writer, "      {pad:<width$}  crucible: {}", overrides.crucible)?;
    }
    for item in &overrides.gear {
        writeln!(writer, "      {pad:<width$}  {}", format_gear(item))?;
    }
    Ok(())
}

fn format_gear(item: &GearSlotSnapshot) -> String {
    let mut line = format!("{}: id={} ilevel={}", item.slot, item.item_id, item.item_level);
    if !item.bonus_ids.is_empty() {
        let ids: Vec<String> = item.bonus_ids.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" bonus_id={}", ids.join("/")));
    }
    if item.enchant_id != 0 {
        line.push_str(&format!(" enchant_id={}", item.enchant_id));
    }
    let gems: Vec<String> = item
        .sockets
        .iter()
        .filter(|socket| socket.gem_id != 0)
        .map(|socket| socket.gem_id.to_string())
        .collect();
    if !gems.is_empty() {
        line.push_str(&format!(" gem_id={}", gems.join("/")));
    }
    let relics: Vec<String> = item
        .sockets
        .iter()
        .filter(|socket| !socket.relic_bonus_ids.is_empty() || socket.relic_item_level != 0)
        .map(|socket| {
            let ids: Vec<String> = socket.relic_bonus_ids.iter().map(ToString::to_string).collect();
            format!(
                "{}@{}+{}",
                ids.join(":"),
                socket.relic_item_level,
                socket.relic_bonus_item_level
            )
        })
        .collect();
    if !relics.is_empty() {
        line.push_str(&format!(" relics={}", relics.join("/")));
    }
    line
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl Orchestrator {
    /// Ranked report over the batch, however it ended.
    ///
    /// # Errors
    ///
    /// Returns [`ProfilesetError::InvalidState`] while a background worker owns
    /// the variants.
    pub fn report(&self) -> Result<ProfilesetReport, ProfilesetError> {
        let variants = self.variants()?;
        let mut report = ProfilesetReport::build(variants, &self.settings().metrics);
        report.cancelled = self.completion() == Some(Completion::Cancelled);
        report.failed = self.completion() == Some(Completion::Failed);
        Ok(report)
    }

    /// Chart rows for the current ranking, bounded by [`MAX_CHART_ENTRIES`].
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::report`].
    pub fn chart(&self) -> Result<Vec<ChartRow>, ProfilesetError> {
        let sorted = generate_sorted_profilesets(self.variants()?, self.primary_metric());
        Ok(generate_chart(&sorted, self.primary_metric()))
    }

    /// Write the JSON document, chart rows included.
    ///
    /// # Errors
    ///
    /// Returns lifecycle errors from [`Orchestrator::report`] and
    /// [`ProfilesetError::Output`] when writing fails.
    pub fn output_json<W: Write>(&self, writer: &mut W) -> Result<(), ProfilesetError> {
        let report = self.report()?.with_chart(self.variants()?);
        report.write_json(writer)?;
        Ok(())
    }

    /// Write the text table.
    ///
    /// # Errors
    ///
    /// Same as [`Orchestrator::output_json`].
    pub fn output_text<W: Write>(&self, writer: &mut W) -> Result<(), ProfilesetError> {
        self.report()?.write_text(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionOverlay;
    use crate::stats::StatisticalSummary;

    fn ranked(values: &[(&str, f64)]) -> Vec<ProfileVariant> {
        (0_u64..)
            .zip(values)
            .map(|(index, (name, mean))| {
                let mut variant = ProfileVariant::new(*name, index, OptionOverlay::default(), false);
                variant.record_result(MetricResult::new(
                    MetricKind::Dps,
                    StatisticalSummary::uniform(*mean),
                    1000,
                ));
                variant
            })
            .collect()
    }

    fn names<'a>(sorted: &[&'a ProfileVariant]) -> Vec<&'a str> {
        sorted.iter().map(|variant| variant.name()).collect()
    }

    #[test]
    fn sorts_descending_with_insertion_tie_break() {
        let variants = ranked(&[("z", 10.0), ("a", 30.0), ("m", 10.0), ("b", 30.0)]);
        let sorted = generate_sorted_profilesets(&variants, MetricKind::Dps);
        assert_eq!(names(&sorted), vec!["a", "b", "z", "m"]);
    }

    #[test]
    fn missing_metric_ranks_as_zero() {
        let mut variants = ranked(&[("scored", 5.0)]);
        variants.push(ProfileVariant::new("empty", 1, OptionOverlay::default(), false));
        let sorted = generate_sorted_profilesets(&variants, MetricKind::Dps);
        assert_eq!(names(&sorted), vec!["scored", "empty"]);
    }

    #[test]
    fn name_length_counts_characters() {
        let variants = ranked(&[("ab", 1.0), ("ñandú", 2.0)]);
        let sorted = generate_sorted_profilesets(&variants, MetricKind::Dps);
        assert_eq!(max_name_length(sorted.iter().map(|variant| variant.name())), 5);
        assert_eq!(max_name_length(std::iter::empty()), 0);

        let report = ProfilesetReport::build(&variants, &[MetricKind::Dps]);
        assert_eq!(max_name_length(report.names()), 5);
        let mut text = Vec::new();
        report.write_text(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("   2. ab     "));
    }

    #[test]
    fn text_header_marks_how_the_run_ended() {
        let variants = ranked(&[("a", 1.0)]);
        let header = |report: &ProfilesetReport| {
            let mut text = Vec::new();
            report.write_text(&mut text).unwrap();
            String::from_utf8(text).unwrap().lines().next().unwrap().to_string()
        };
        let mut report = ProfilesetReport::build(&variants, &[MetricKind::Dps]);
        assert_eq!(header(&report), "Profilesets ranked by dps (1 entries)");
        report.cancelled = true;
        assert!(header(&report).ends_with(", cancelled)"));
        report.cancelled = false;
        report.failed = true;
        assert!(header(&report).ends_with(", failed)"));
    }

    #[test]
    fn text_and_json_expose_the_same_entries() {
        let variants = ranked(&[("low", 1.0), ("high", 2.0)]);
        let report = ProfilesetReport::build(&variants, &[MetricKind::Dps]);

        let mut json = Vec::new();
        report.write_json(&mut json).unwrap();
        let parsed: ProfilesetReport = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, report);

        let mut text = Vec::new();
        report.write_text(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].contains("ranked by dps"));
        assert!(lines[1].contains("1. high"));
        assert!(lines[2].contains("2. low "));
        assert!(lines[1].contains("iterations 1000"));
    }

    #[test]
    fn chart_csv_has_header_and_rows() {
        let variants = ranked(&[("a,b", 1.0)]);
        let report = ProfilesetReport::build(&variants, &[MetricKind::Dps]).with_chart(&variants);
        let mut csv = Vec::new();
        report.write_chart_csv(&mut csv).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("rank,name,mean,min,first_quartile,median,third_quartile,max")
        );
        assert_eq!(
            lines.next(),
            Some("1,\"a,b\",1.000,1.000,1.000,1.000,1.000,1.000")
        );
    }
}
