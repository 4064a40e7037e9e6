mod console;
mod engine;
mod input;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use engine::SyntheticEngine;
use input::parse_profile;
use profileset_engine::{Completion, Orchestrator, ProfilesetReport, SimConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored ranking summary
    Console,
    /// Aligned plain-text table
    Text,
    /// Structured JSON document
    Json,
    /// Chart rows as CSV
    Chart,
}

#[derive(Debug, Parser)]
#[command(name = "profileset-runner", version)]
#[command(about = "Evaluate profile sets against a baseline profile and rank the results")]
struct Args {
    /// Profile file with baseline options and profileset definitions
    input: PathBuf,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Override the baseline iteration count
    #[arg(long)]
    iterations: Option<u64>,

    /// Run profilesets on the calling thread instead of a background worker
    #[arg(long)]
    sync: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    announce_banner();

    let start_time = Instant::now();
    let orchestrator = run_profilesets(&args)?;
    write_reports(&args, &orchestrator, start_time)?;
    Ok(())
}

fn announce_banner() {
    eprintln!("{}", "⚙️  Profileset Runner".bright_cyan().bold());
    eprintln!("{}", "=====================".cyan());
}

fn load_orchestrator(args: &Args) -> Result<Orchestrator> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let profile = parse_profile(&text)
        .with_context(|| format!("invalid profile {}", args.input.display()))?;
    log::debug!(
        "loaded {} baseline options and {} profilesets from {}",
        profile.baseline.len(),
        profile.profilesets.len(),
        args.input.display()
    );

    let mut baseline =
        SimConfig::parse(&profile.baseline).context("invalid baseline options")?;
    if let Some(iterations) = args.iterations {
        baseline.set("iterations", iterations.to_string());
    }
    let mut orchestrator = Orchestrator::new(baseline).context("invalid baseline options")?;
    orchestrator
        .parse(&profile.profilesets)
        .context("invalid profileset definitions")?;
    Ok(orchestrator)
}

fn run_profilesets(args: &Args) -> Result<Orchestrator> {
    let mut orchestrator = load_orchestrator(args)?;
    eprintln!(
        "Running {} profilesets ranked by {}",
        orchestrator.n_profilesets().to_string().bold(),
        orchestrator.primary_metric().to_string().bold()
    );

    if orchestrator.initialize()?.is_cancelled() {
        return Ok(orchestrator);
    }

    let engine = Arc::new(SyntheticEngine);
    let completion = if args.sync {
        orchestrator.iterate(engine.as_ref())?
    } else {
        orchestrator.iterate_background(engine)?;
        poll_progress(&orchestrator, args.verbose);
        orchestrator.wait()?
    };

    let progress = orchestrator.progress();
    let summary = format!(
        "{} of {} profilesets completed",
        progress.completed, progress.total
    );
    match completion {
        Completion::Finished => eprintln!("✅ {}", summary.green()),
        Completion::Cancelled => eprintln!("⚠️  {}", summary.yellow()),
        Completion::Failed => eprintln!("❌ {}", summary.red()),
    }
    Ok(orchestrator)
}

fn poll_progress(orchestrator: &Orchestrator, verbose: bool) {
    let mut last_reported: Option<String> = None;
    while !orchestrator.wait_until_done(Some(POLL_INTERVAL)) {
        let current = orchestrator.current_profileset_name();
        if verbose && current.is_some() && current != last_reported {
            let progress = orchestrator.progress();
            eprintln!(
                "   [{}/{}] {}",
                progress.claimed,
                progress.total,
                current.as_deref().unwrap_or_default().dimmed()
            );
            last_reported = current;
        }
    }
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    generated_at: String,
    #[serde(flatten)]
    report: &'a ProfilesetReport,
}

fn write_reports(args: &Args, orchestrator: &Orchestrator, start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    let report = orchestrator.report()?;

    match args.report {
        ReportFormat::Json => {
            let document = JsonDocument {
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                report: &report.with_chart(orchestrator.variants()?),
            };
            serde_json::to_writer_pretty(&mut output_target, &document)?;
            writeln!(&mut output_target)?;
        }
        ReportFormat::Text => report.write_text(&mut output_target)?,
        ReportFormat::Chart => {
            report
                .with_chart(orchestrator.variants()?)
                .write_chart_csv(&mut output_target)?;
        }
        ReportFormat::Console => {
            console::generate_console_report(
                &mut output_target,
                &report,
                orchestrator.progress(),
                start_time.elapsed(),
            )?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
