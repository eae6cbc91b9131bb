mod browser;
mod extract;
mod fetch;
mod normalize;
mod orchestrator;
mod pipeline;
mod settings;
mod sink;
mod sources;
mod utils;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::bail;
use clap::{Parser, Subcommand};
use itertools::Itertools;

use settings::Settings;

#[derive(Parser)]
#[command(name = "stat-harvest", about = "Harvest statistics and open data with fallbacks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one source through its fallback plan
    Run {
        /// Built-in source name (see `sources`)
        source: String,
        /// Output directory (default: from config, else ./datasets)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Read pages as static HTML instead of launching Chromium
        #[arg(long)]
        no_browser: bool,
    },
    /// List built-in sources and their plans
    Sources,
}

#[tokio::main(flavor = "current_thread")]
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
        Commands::Run {
            source,
            out,
            no_browser,
        } => {
            let settings = Settings::load()?;
            let Some(source) = sources::find(&source) else {
                bail!("unknown source {:?}; run `stat-harvest sources` to list them", source);
            };
            let out_dir = out.unwrap_or_else(|| settings.out_dir.clone());

            let summary = pipeline::run(&source, &settings, &out_dir, no_browser).await?;

            println!("\n{} ({})", summary.title, source.name());
            for attempt in &summary.attempts {
                match &attempt.outcome {
                    orchestrator::Outcome::Error(reason) => {
                        println!("  {:<10} error: {}", attempt.source, truncate(reason, 80))
                    }
                    outcome => println!("  {:<10} {:?}", attempt.source, outcome),
                }
            }
            for file in &summary.files {
                println!("  -> {}", file.display());
            }
            println!("  -> {}", summary.manifest.display());

            match summary.winner {
                Some(kind) if kind.is_synthetic() => {
                    println!("Only sample data could be produced (marked synthetic).");
                    Ok(())
                }
                Some(kind) => {
                    let rows = summary.rows.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
                    println!("Done via {}: {} rows.", kind, rows);
                    Ok(())
                }
                None => Err(anyhow::anyhow!("every stage failed for {}", source.name())),
            }
        }
        Commands::Sources => {
            for s in sources::builtin() {
                let plan = pipeline::plan_for(&s)?;
                println!("{:<32} | {}", s.name(), s.describe());
                println!("{:<32} | {}", "", plan.iter().map(|st| st.kind()).join(" -> "));
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
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
