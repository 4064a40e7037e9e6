use std::io::{self, Write};
use std::time::Duration;

use colored::Colorize;
use profileset_engine::{Progress, ProfilesetReport, ReportEntry, max_name_length};

pub fn generate_console_report<W: Write>(
    writer: &mut W,
    report: &ProfilesetReport,
    progress: Progress,
    total_duration: Duration,
) -> io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Profileset Results".bright_cyan().bold())?;
    writeln!(writer, "{}", "=====================".cyan())?;

    writeln!(writer, "Ranking metric: {}", report.metric.to_string().bold())?;
    writeln!(
        writer,
        "Completed: {}/{}",
        progress.completed.to_string().green(),
        progress.total
    )?;
    if report.failed {
        writeln!(writer, "{}", "Run stopped on an error; results are partial".red())?;
    } else if report.cancelled {
        writeln!(writer, "{}", "Run was cancelled; results are partial".red())?;
    }
    writeln!(writer, "Total time: {total_duration:?}")?;
    writeln!(writer)?;

    let Some(top) = report.results.first() else {
        writeln!(writer, "No profilesets executed.")?;
        return Ok(());
    };
    let width = max_name_length(report.names());
    for entry in &report.results {
        write_entry(writer, entry, top.values.mean, width)?;
    }
    Ok(())
}

fn write_entry<W: Write>(
    writer: &mut W,
    entry: &ReportEntry,
    top_mean: f64,
    width: usize,
) -> io::Result<()> {
    let delta = if top_mean > 0.0 {
        (entry.values.mean / top_mean - 1.0) * 100.0
    } else {
        0.0
    };
    let delta = if entry.rank == 1 {
        "top".green().to_string()
    } else {
        format!("{delta:+.2}%").yellow().to_string()
    };
    writeln!(
        writer,
        "{:>4}. {} {:>12.1} ±{:<10.1} {}",
        entry.rank,
        format!("{:<width$}", entry.name).bold(),
        entry.values.mean,
        entry.values.stddev,
        delta
    )?;
    for extra in &entry.additional_metrics {
        writeln!(
            writer,
            "      {:<width$} {:>12.1} {}",
            "",
            extra.values.mean,
            extra.metric.to_string().dimmed()
        )?;
    }
    for kind in &entry.unsupported_metrics {
        writeln!(
            writer,
            "      {:<width$} {}",
            "",
            format!("{kind} not supported").yellow()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use profileset_engine::{MetricKind, MetricValues};

    fn entry(rank: usize, name: &str, mean: f64) -> ReportEntry {
        ReportEntry {
            rank,
            name: name.to_string(),
            values: MetricValues {
                mean,
                median: mean,
                min: mean,
                max: mean,
                first_quartile: mean,
                third_quartile: mean,
                stddev: 0.0,
                iterations: 10,
            },
            additional_metrics: Vec::new(),
            unsupported_metrics: vec![MetricKind::Dpsp],
            overrides: None,
        }
    }

    #[test]
    fn console_report_lists_entries_in_rank_order() {
        let report = ProfilesetReport {
            metric: MetricKind::Dps,
            cancelled: true,
            failed: false,
            results: vec![entry(1, "fast", 200.0), entry(2, "slow", 100.0)],
            chart: Vec::new(),
        };
        let progress = Progress {
            claimed: 2,
            completed: 2,
            total: 3,
        };
        let mut out = Vec::new();
        generate_console_report(&mut out, &report, progress, Duration::from_millis(5)).unwrap();
        let text = String::from_utf8(out).unwrap();
        let fast = text.find("fast").unwrap();
        let slow = text.find("slow").unwrap();
        assert!(fast < slow);
        assert!(text.contains("-50.00%"));
        assert!(text.contains("cancelled"));
        assert!(text.contains("dpsp not supported"));
    }

    #[test]
    fn console_report_handles_failed_empty_batch() {
        let report = ProfilesetReport {
            metric: MetricKind::Hps,
            cancelled: false,
            failed: true,
            results: Vec::new(),
            chart: Vec::new(),
        };
        let mut out = Vec::new();
        generate_console_report(&mut out, &report, Progress::default(), Duration::ZERO).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("No profilesets executed."));
        assert!(text.contains("stopped on an error"));
    }
}
