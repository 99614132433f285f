mod db;
mod error;
mod extract;
mod fetch;
mod harvest;
mod normalize;

use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ufc_scraper", about = "Incremental ufcstats.com harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the event and bout sets from the completed-events list
    Discover {
        /// Max unscraped event pages to harvest (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Drain bouts whose details have not been scraped yet
    FillDetails {
        /// Records claimed per batch
        #[arg(long, default_value_t = 20)]
        batch: usize,
    },
    /// Discover + fill-details in one pipeline
    Run {
        /// Max unscraped event pages to harvest (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Records claimed per batch
        #[arg(long, default_value_t = 20)]
        batch: usize,
    },
    /// Show harvest progress counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let stats = harvest::discover(&conn, limit).await?;
            print_discover(&stats);
            Ok(())
        }
        Commands::FillDetails { batch } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let report = harvest::fill_details(&conn, batch).await?;
            print_fill(&report);
            Ok(())
        }
        Commands::Run { limit, batch } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let stats = harvest::discover(&conn, limit).await?;
            print_discover(&stats);
            let report = harvest::fill_details(&conn, batch).await?;
            print_fill(&report);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Events:   {} ({} scraped)", s.events, s.events_scraped);
            println!(
                "Bouts:    {} ({} scraped, {} claimed)",
                s.bouts, s.bouts_scraped, s.bouts_claimed
            );
            println!("Results:  {}", s.result_rows);
            println!("Totals:   {}", s.total_rows);
            println!("Strikes:  {}", s.strike_rows);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_discover(stats: &harvest::DiscoverStats) {
    println!(
        "Discovered {} new events; harvested {} event pages ({} failed, {} new bouts).",
        stats.new_events, stats.events_processed, stats.events_failed, stats.new_bouts
    );
    if stats.fallbacks > 0 {
        println!("Parse fallbacks: {}", stats.fallbacks);
    }
}

fn print_fill(report: &harvest::PassReport) {
    println!(
        "Done: {} scraped, {} failed, {} already done.",
        report.succeeded, report.failed, report.skipped
    );
    if report.fallbacks > 0 {
        println!("Parse fallbacks: {}", report.fallbacks);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
