//! Job scraper CLI
//!
//! Runs a scrape over the configured (city, position) targets and reads
//! trend summaries back from the dataset tree.

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use job_scraper::{
    CsvDatasetStore, Dashboard, DashboardQuery, DashboardView, Orchestrator, ScrapeConfig, TimeWindow,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::settings::Overrides;

#[derive(Parser)]
#[command(name = "job-scraper")]
#[command(about = "Scrape job postings per city and position, and summarize trends")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the dataset tree
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every target and update datasets
    Run(Overrides),

    /// Show the trend summary of one dataset
    Summary {
        #[arg(long)]
        position: String,

        /// City dataset to read; the position's aggregate when omitted
        #[arg(long)]
        city: Option<String>,

        /// 24h, week, month or all
        #[arg(long, default_value = "all")]
        window: TimeWindow,

        /// Print the whole view as JSON
        #[arg(long)]
        json: bool,
    },

    /// List positions with stored datasets
    Positions,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_scraper=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(mut overrides) => {
            overrides.data_dir = cli.data_dir;
            let config = settings::load(cli.config.as_deref(), &overrides)?;
            run(config).await
        }
        Commands::Summary {
            position,
            city,
            window,
            json,
        } => {
            let config = settings::load(cli.config.as_deref(), &read_only(cli.data_dir))?;
            summary(config, position, city, window, json).await
        }
        Commands::Positions => {
            let config = settings::load(cli.config.as_deref(), &read_only(cli.data_dir))?;
            positions(config).await
        }
    }
}

fn read_only(data_dir: Option<PathBuf>) -> Overrides {
    Overrides {
        data_dir,
        ..Overrides::default()
    }
}

async fn run(config: ScrapeConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).context("Invalid scrape configuration")?;

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight requests");
            signal.cancel();
        }
    });

    let run = orchestrator.run(cancel).await.context("Scrape run failed")?;
    println!("{run}");

    if run.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

async fn summary(
    config: ScrapeConfig,
    position: String,
    city: Option<String>,
    window: TimeWindow,
    json: bool,
) -> Result<()> {
    let dashboard = Dashboard::new(Arc::new(CsvDatasetStore::new(config.data_dir)));

    let mut query = DashboardQuery::new(position).with_window(window);
    if let Some(city) = city {
        query = query.with_city(city);
    }

    let view = dashboard
        .view(&query)
        .await
        .with_context(|| format!("Failed to load {}", query.dataset_key()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

fn print_view(view: &DashboardView) {
    let summary = &view.summary;
    println!("{} ({}): {} postings", view.key, summary.window, summary.total);

    let breakdowns = [
        ("City", &summary.by_city),
        ("Seniority", &summary.by_seniority),
        ("Employment type", &summary.by_employment_type),
        ("Industry", &summary.by_industry),
        ("Company size", &summary.by_company_size),
    ];
    for (title, counts) in breakdowns {
        println!("\n{title}");
        for (label, count) in counts {
            println!("  {label:<30} {count:>6}");
        }
    }

    if !view.comparison.is_empty() {
        println!("\n{:<20} {:>6} {:>6} {:>6} {:>7} {:>6}", "City", "24h", "week", "month", "total", "new");
        for row in &view.comparison {
            println!(
                "{:<20} {:>6} {:>6} {:>6} {:>7} {:>6}",
                row.city, row.last_24h, row.last_week, row.last_month, row.total, row.new_in_latest_run
            );
        }
    }

    if !view.upstream.is_empty() {
        println!("\nListed upstream ({})", view.summary.window);
        for row in &view.upstream {
            let delta = row.delta.map(|d| format!("{d:+}")).unwrap_or_default();
            println!("  {:<20} {:>7} {:>6}  as of {}", row.city, row.count, delta, row.date);
        }
    }
}

async fn positions(config: ScrapeConfig) -> Result<()> {
    let dashboard = Dashboard::new(Arc::new(CsvDatasetStore::new(config.data_dir)));

    for position in dashboard.positions().await? {
        let cities = dashboard.cities(&position).await?;
        println!("{position}: {}", cities.join(", "));
    }
    Ok(())
}
