//! rigctl entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rig_common::{KnowledgeStore, RelationKind, RigConfig, ShellRunner};
use rigctl::{OfflineOracle, ResolutionEngine};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rigctl", version, about = "Development environment provisioning assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and install a tool stack for a domain description
    Setup {
        /// Domain description, e.g. "python machine learning"
        #[arg(required = true)]
        domain: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Also write the machine-readable report to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// Show install statistics from the knowledge store
    Stats {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Show entities related to a tool
    Related {
        tool: String,
        /// Restrict to one relationship kind (e.g. DEPENDS_ON)
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// Show recent install events
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = RigConfig::load_or_default();
    let store = KnowledgeStore::open(&config.data_dir());

    match cli.command {
        Commands::Setup {
            domain,
            yes,
            report_json,
        } => {
            let domain = domain.join(" ");
            setup(&store, config, &domain, yes, report_json).await?;
        }
        Commands::Stats { days } => {
            let stats = store.statistics(days)?;
            for line in rigctl::ui::format_stats(&stats) {
                println!("{}", line);
            }
        }
        Commands::Related { tool, kind, depth } => {
            let kind = kind.as_deref().map(RelationKind::parse).transpose()?;
            let related: Vec<_> = store.query_related(&tool, kind, depth).collect();
            for line in rigctl::ui::format_related(&tool, &related) {
                println!("{}", line);
            }
        }
        Commands::History { limit } => {
            let events = store.recent_events(limit)?;
            for line in rigctl::ui::format_history(&events) {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

async fn setup(
    store: &KnowledgeStore,
    config: RigConfig,
    domain: &str,
    yes: bool,
    report_json: Option<PathBuf>,
) -> Result<()> {
    if !yes && !confirm(&format!("Resolve and install a stack for \"{}\"?", domain))? {
        println!("Aborted.");
        return Ok(());
    }

    let oracle = OfflineOracle;
    let runner = ShellRunner::new();
    let engine = ResolutionEngine::new(store, &oracle, &runner, config);

    // Ctrl-C stops scheduling new tools; the in-flight attempt finishes
    // or times out.
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let spinner = rigctl::ui::spinner("Resolving stack...");
    let report = engine.run(domain).await?;
    spinner.finish_and_clear();

    for line in rigctl::ui::format_report(&report) {
        println!("{}", line);
    }

    if let Some(path) = report_json {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
