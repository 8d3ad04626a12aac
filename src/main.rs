use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

mod error;
mod history;
mod models;
mod profile;
mod report;
mod risk;
mod session;
mod signal;
mod store;

use history::RollingHistory;
use models::WeightSet;
use profile::{Domain, DomainProfile};
use session::Session;
use signal::{Scenario, SimulatedCity};

#[derive(Parser)]
#[command(name = "city-ops")]
#[command(about = "Sector risk fusion and rolling trends for city operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SessionArgs {
    #[arg(long, value_enum, default_value_t = Domain::Traffic)]
    domain: Domain,
    /// Load a JSON profile instead of the built-in one for --domain
    #[arg(long)]
    profile: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Scenario::Normal)]
    scenario: Scenario,
    #[arg(long, default_value_t = 24)]
    ticks: usize,
    #[arg(long, default_value_t = history::DEFAULT_CAPACITY)]
    capacity: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Override a component weight, e.g. --weight sensor=0.8
    #[arg(long = "weight", value_parser = parse_weight)]
    weights: Vec<(String, f64)>,
    /// Sectors serviced per tick, worst first
    #[arg(long, default_value_t = 0)]
    service_capacity: usize,
    /// Import citizen reports from a CSV file
    #[arg(long)]
    reports: Option<PathBuf>,
    /// Start without the example citizen reports
    #[arg(long)]
    no_seed_reports: bool,
    /// Remove an imported citizen report by id before scoring
    #[arg(long = "drop-report")]
    drop_reports: Vec<Uuid>,
    /// Simulation start time (RFC 3339); defaults to now
    #[arg(long)]
    start: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ticks and print the latest sector scores
    Simulate {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        json: bool,
    },
    /// Run ticks and write a markdown report
    Report {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Run ticks and write the history series as CSV
    Export {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long, default_value = "history.csv")]
        out: PathBuf,
    },
    /// Print a built-in profile as JSON
    Profile {
        #[arg(long, value_enum, default_value_t = Domain::Traffic)]
        domain: Domain,
    },
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw}"))?;
    let weight: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid weight {value}"))?;
    Ok((name.trim().to_string(), weight))
}

fn open_session(args: &SessionArgs) -> anyhow::Result<Session<SimulatedCity>> {
    let profile = match &args.profile {
        Some(path) => DomainProfile::load(path)
            .with_context(|| format!("failed to load profile {}", path.display()))?,
        None => DomainProfile::builtin(args.domain),
    };
    if args.ticks == 0 {
        bail!("--ticks must be at least 1");
    }

    let start = args.start.unwrap_or_else(Utc::now);
    let source = SimulatedCity::new(profile.domain, args.scenario, args.seed, start);
    let history = RollingHistory::new(args.capacity)?;
    let seeds = profile.seed_reports.clone();

    let mut session = Session::new(profile, source, history)?
        .with_service_capacity(args.service_capacity);

    if !args.weights.is_empty() {
        let overrides: WeightSet = args.weights.iter().cloned().collect();
        session.set_weights(&overrides)?;
    }
    if !args.no_seed_reports {
        session.reports_mut().seed_defaults(&seeds, start)?;
    }
    if let Some(path) = &args.reports {
        session.reports_mut().import_csv(path)?;
    }
    for id in &args.drop_reports {
        let removed = session.reports_mut().remove(*id)?;
        info!(id = %removed.id, sector = %removed.sector, "citizen report removed");
    }

    let recorded = session.run(args.ticks);
    if recorded == 0 {
        bail!("none of the {} requested ticks could be scored", args.ticks);
    }
    info!(
        profile = %session.profile().name,
        recorded,
        requested = args.ticks,
        reports = session.reports().len(),
        "session complete"
    );
    Ok(session)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { session, json } => {
            let session = open_session(&session)?;
            let Some(latest) = session.history().latest() else {
                println!("No ticks recorded.");
                return Ok(());
            };

            if json {
                println!("{}", serde_json::to_string_pretty(latest)?);
                return Ok(());
            }

            println!(
                "{} at {}",
                session.profile().name,
                latest.timestamp.format("%Y-%m-%d %H:%M")
            );
            for score in latest.scores.iter() {
                println!("- {}", report::describe(score));
            }
            let delta = session
                .history()
                .avg_delta()
                .map(|d| format!(" ({d:+.1})"))
                .unwrap_or_default();
            println!(
                "avg {:.1}{} / max {:.1} / {} alert(s)",
                latest.aggregates.avg, delta, latest.aggregates.max, latest.aggregates.alert_count
            );
        }
        Commands::Report { session, out } => {
            let session = open_session(&session)?;
            let report =
                report::build_report(session.profile(), session.history(), session.reports());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { session, out } => {
            let session = open_session(&session)?;
            let rows = report::export_history_csv(session.history(), &out)?;
            println!("Wrote {rows} snapshots to {}.", out.display());
        }
        Commands::Profile { domain } => {
            let profile = DomainProfile::builtin(domain);
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}
