mod analytics;
mod index;
mod normalize;
mod persist;
mod pipeline;
mod records;
mod resolve;
mod search;
mod store;
mod views;

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::records::Collections;
use crate::resolve::PrimaryMode;

const DEFAULT_SNAPSHOT_DIR: &str = "data/raw";
const DEFAULT_OUT_DIR: &str = "out";

#[derive(Parser)]
#[command(name = "story_pipeline", about = "Story archive materialization pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch raw collections from the record store into a snapshot directory
    Fetch {
        /// Snapshot directory to write
        #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
        snapshot: PathBuf,
    },
    /// Build all views from a snapshot
    Build {
        /// Snapshot directory to read
        #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
        snapshot: PathBuf,
        /// Output directory for the views
        #[arg(short, long, default_value = DEFAULT_OUT_DIR)]
        out: PathBuf,
        /// Theme propagation mode
        #[arg(long, value_enum, default_value_t = PrimaryMode::Media)]
        mode: PrimaryMode,
    },
    /// Fetch + build in one invocation
    Run {
        /// Snapshot directory (written by fetch, read by build)
        #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
        snapshot: PathBuf,
        /// Output directory for the views
        #[arg(short, long, default_value = DEFAULT_OUT_DIR)]
        out: PathBuf,
        /// Theme propagation mode
        #[arg(long, value_enum, default_value_t = PrimaryMode::Media)]
        mode: PrimaryMode,
    },
    /// Print overview analytics for a snapshot
    Stats {
        /// Snapshot directory to read
        #[arg(long, default_value = DEFAULT_SNAPSHOT_DIR)]
        snapshot: PathBuf,
        /// Theme propagation mode
        #[arg(long, value_enum, default_value_t = PrimaryMode::Media)]
        mode: PrimaryMode,
        /// Max theme rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
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
        Commands::Fetch { snapshot } => {
            let collections = store::fetch_all_collections().await?;
            collections.save_snapshot(&snapshot)?;
            println!(
                "Fetched {} records into {:?}",
                collections.total_records(),
                snapshot
            );
            Ok(())
        }
        Commands::Build { snapshot, out, mode } => build(&snapshot, &out, mode),
        Commands::Run { snapshot, out, mode } => {
            let collections = store::fetch_all_collections().await?;
            collections.save_snapshot(&snapshot)?;
            println!("Fetched {} records", collections.total_records());
            build(&snapshot, &out, mode)
        }
        Commands::Stats { snapshot, mode, limit } => stats(&snapshot, mode, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build(snapshot: &std::path::Path, out: &std::path::Path, mode: PrimaryMode) -> anyhow::Result<()> {
    let collections = Collections::from_snapshot(snapshot)?;
    if collections.total_records() == 0 {
        println!("Snapshot {:?} is empty. Run 'fetch' first.", snapshot);
    }
    let views = pipeline::materialize(&collections, mode, Utc::now())?;
    let written = persist::write_views(out, &views)?;
    println!("Built {} views into {:?}", written, out);
    Ok(())
}

fn stats(snapshot: &std::path::Path, mode: PrimaryMode, limit: usize) -> anyhow::Result<()> {
    let collections = Collections::from_snapshot(snapshot)?;
    let m = pipeline::run(&collections, mode);
    let o = &m.analytics.overview;

    println!("Stories:      {}", o.total_stories);
    println!("Storytellers: {}", o.total_storytellers);
    println!("Themes:       {}", o.total_themes);
    println!("Media:        {}", o.total_media);
    println!("Locations:    {}", o.total_locations);
    println!("Stories/storyteller: {:.2}", o.average_stories_per_storyteller);

    if !m.analytics.top_themes.is_empty() {
        println!(
            "\n{:>3} | {:<32} | {:<12} | {:>7} | {:>6}",
            "#", "Theme", "Category", "Stories", "%"
        );
        println!("{}", "-".repeat(72));
        for (i, t) in m.analytics.top_themes.iter().take(limit).enumerate() {
            println!(
                "{:>3} | {:<32} | {:<12} | {:>7} | {:>5.1}%",
                i + 1,
                truncate(&t.name, 32),
                t.category,
                t.story_count,
                t.percentage
            );
        }
    }

    if !m.analytics.locations_ranked.is_empty() {
        println!("\n--- Locations ---");
        for l in &m.analytics.locations_ranked {
            println!("  {:<24} {}", truncate(&l.location, 24), l.count);
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
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
