use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fpl_live::cache::SystemClock;
use fpl_live::calculate::rank_match;
use fpl_live::config::{AppConfig, ProviderKind};
use fpl_live::fetch::{FileSnapshotProvider, HttpSnapshotProvider, PicksDocument, SnapshotProvider};
use fpl_live::models::{FixtureId, GameweekSnapshot, ManagerId};
use fpl_live::parse_duration;
use fpl_live::storage::{FileResultStore, JsonlWriter, StorageConfig};
use fpl_live::sync::{derive_results, LiveCoordinator, PollOutcome};

#[derive(Parser)]
#[command(name = "fpl-live")]
#[command(about = "Live fantasy football scoring with provisional bonus prediction")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the provider and keep derived results fresh
    Live {
        /// Poll once and exit
        #[arg(long)]
        once: bool,

        /// Poll continuously until interrupted
        #[arg(long)]
        watch: bool,

        /// Poll interval (e.g., "15s", "1m")
        #[arg(long)]
        interval: Option<String>,

        /// Gameweek to follow (defaults to the provider's current one)
        #[arg(long)]
        gameweek: Option<u32>,

        /// Manager to aggregate (repeatable)
        #[arg(long = "manager")]
        managers: Vec<u64>,
    },

    /// Rank fixtures from a snapshot file and print predicted bonus
    Rank {
        /// Gameweek snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,

        /// Only rank this fixture
        #[arg(long)]
        fixture: Option<u32>,
    },

    /// Aggregate one manager's live totals from local files
    Team {
        /// Gameweek snapshot JSON
        #[arg(long)]
        snapshot: PathBuf,

        /// Picks JSON
        #[arg(long)]
        picks: PathBuf,

        /// Manager id to label the totals with
        #[arg(long, default_value = "0")]
        manager: u64,
    },

    /// Start the API server
    Serve {
        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port number
        #[arg(long)]
        port: Option<u16>,

        /// Start live polling on startup
        #[arg(long)]
        live: bool,
    },
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn select_provider(config: &AppConfig) -> Result<Arc<dyn SnapshotProvider>> {
    let provider: Arc<dyn SnapshotProvider> = match config.provider.kind {
        ProviderKind::Http => Arc::new(
            HttpSnapshotProvider::new(config.provider.http())
                .context("Failed to create HTTP provider")?,
        ),
        ProviderKind::File => Arc::new(FileSnapshotProvider::new(
            config.provider.snapshot_dir.clone(),
        )),
    };
    tracing::info!("Using {} snapshot provider", provider.name());
    Ok(provider)
}

fn build_coordinator(config: &AppConfig) -> Result<Arc<LiveCoordinator>> {
    let storage = StorageConfig::new(config.data_dir.clone());
    let history = JsonlWriter::new(storage.history_path());
    let store = Arc::new(FileResultStore::new(storage));

    let coordinator = LiveCoordinator::new(
        config.poll_config()?,
        select_provider(config)?,
        store,
        Arc::new(SystemClock),
    )
    .with_history(history);

    Ok(Arc::new(coordinator))
}

fn read_snapshot(path: &PathBuf) -> Result<GameweekSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

async fn wait_for_shutdown(coordinator: &LiveCoordinator) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    coordinator.stop();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    init_tracing(&config.log_level, cli.json_logs);
    tracing::info!("Starting fpl-live v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Live {
            once,
            watch,
            interval,
            gameweek,
            managers,
        } => {
            if let Some(interval) = interval {
                if parse_duration(&interval).is_none() {
                    anyhow::bail!("Invalid --interval: {}", interval);
                }
                config.live.poll_interval = interval;
            }
            if gameweek.is_some() {
                config.live.gameweek = gameweek;
            }
            if !managers.is_empty() {
                config.live.managers = managers;
            }
            config.validate()?;

            let coordinator = build_coordinator(&config)?;

            if once {
                match coordinator.poll_once().await? {
                    PollOutcome::Refreshed(summary) => {
                        println!("\n=== Live Refresh ===");
                        println!("Gameweek:         {}", summary.gameweek);
                        println!("Event counter:    {}", summary.event_count);
                        println!(
                            "Fixtures ranked:  {} ({} changed)",
                            summary.fixtures_ranked, summary.matches_changed
                        );
                        println!(
                            "Teams aggregated: {} ({} changed)",
                            summary.teams_aggregated, summary.teams_changed
                        );
                        if summary.squads_skipped > 0 {
                            println!("Squads skipped:   {}", summary.squads_skipped);
                        }
                    }
                    PollOutcome::Unchanged { event_count } => {
                        println!("No new events (counter {})", event_count);
                    }
                    PollOutcome::Discarded => println!("Poll discarded"),
                }
            } else if watch {
                let handle = coordinator
                    .start()
                    .context("Live mode already running")?;
                wait_for_shutdown(&coordinator).await;
                handle.await?;
            } else {
                eprintln!("Specify --once or --watch");
            }
        }
        Commands::Rank { snapshot, fixture } => {
            let snapshot = read_snapshot(&snapshot)?;
            let results: Vec<_> = snapshot
                .started_fixtures()
                .filter(|f| fixture.map_or(true, |id| f.id == FixtureId(id)))
                .map(|f| rank_match(f, &snapshot.stats_for(f.id), snapshot.as_of))
                .collect();

            if let Some(id) = fixture {
                if results.is_empty() {
                    anyhow::bail!("Fixture {} not found or not started", id);
                }
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Team {
            snapshot,
            picks,
            manager,
        } => {
            let snapshot = read_snapshot(&snapshot)?;
            let content = std::fs::read_to_string(&picks)
                .with_context(|| format!("Failed to read picks {}", picks.display()))?;
            let doc: PicksDocument = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse picks {}", picks.display()))?;
            let squad = doc.into_squad(ManagerId(manager), snapshot.gameweek);

            let results = derive_results(&snapshot, std::slice::from_ref(&squad));
            let totals = results
                .teams
                .into_iter()
                .next()
                .context("No totals produced")?;
            println!("{}", serde_json::to_string_pretty(&totals)?);
        }
        Commands::Serve { host, port, live } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            let coordinator = build_coordinator(&config)?;
            if live && coordinator.start().is_some() {
                tracing::info!("Live polling enabled");
            }

            let state = fpl_live::api::state::AppState::new(coordinator.clone());
            let app = fpl_live::api::build_router(state, &config.server);
            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("API: http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { wait_for_shutdown(&coordinator).await })
                .await?;
        }
    }

    Ok(())
}
