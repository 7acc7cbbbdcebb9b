//! The proxy pool's single entry point: loads configuration, brings up
//! the Store, Lease Manager, reaper, and HTTP API, then drops into a
//! small interactive menu that delegates every option to those
//! components (spec §6). Exit code 0 on a clean `quit`, non-zero on an
//! unhandled error.

use proxypool_core::api::{self, ApiState};
use proxypool_core::batch::BatchRunner;
use proxypool_core::checkpoint::CheckpointManager;
use proxypool_core::config::Config;
use proxypool_core::lease::LeaseManager;
use proxypool_core::models::{CheckpointKind, ProbeSelection, ProtocolHint};
use proxypool_core::prober::browser::UnconfiguredRenderer;
use proxypool_core::signal::SignalBus;
use proxypool_core::storage::ProxyStore;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

const REAPER_TICK: Duration = Duration::from_secs(300);
const HEARTBEAT_TIMEOUT_S: i64 = 1_800;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "proxypool.toml".to_string());
    let config = Arc::new(Config::load(&config_path)?);
    tracing::info!(path = %config_path, "configuration loaded");

    let store = Arc::new(ProxyStore::open(&config.main.db_file)?);
    let checkpoints = Arc::new(CheckpointManager::new(&config.interrupt)?);
    let signal = SignalBus::new();
    signal.install_ctrl_c_handler();

    let leases = Arc::new(LeaseManager::new(store.clone()));
    leases.load().await?;
    tracing::info!(count = store.count().await?, "lease index loaded from store");

    let _reaper = LeaseManager::spawn_reaper(leases.clone(), store.clone(), signal.clone(), REAPER_TICK, HEARTBEAT_TIMEOUT_S);

    let state = ApiState {
        store: store.clone(),
        leases: leases.clone(),
        signal: signal.clone(),
        config: config.clone(),
    };
    let router = api::router(state);
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API listening");

    let server_signal = signal.clone();
    let server = tokio::spawn(async move {
        let shutdown = async move {
            loop {
                if server_signal.is_tripped() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
            tracing::error!("API server error: {e}");
        }
    });

    let exit_code = run_menu(store, checkpoints, signal.clone(), leases, config).await;
    server.abort();
    std::process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();
}

/// A minimal interactive menu (spec §6): every option delegates to an
/// existing component rather than reimplementing its logic here.
async fn run_menu(
    store: Arc<ProxyStore>,
    checkpoints: Arc<CheckpointManager>,
    signal: SignalBus,
    leases: Arc<LeaseManager>,
    config: Arc<Config>,
) -> i32 {
    loop {
        print_menu();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            return 0;
        }
        match line.trim() {
            "1" => {
                let outcome = checkpoints.startup(CheckpointKind::Crawl, &store).await;
                match outcome {
                    Ok(o) => match o.record {
                        Some(record) => {
                            let runner = BatchRunner {
                                store: &store,
                                checkpoints: &checkpoints,
                                signal: &signal,
                                config: &config,
                            };
                            let now = chrono::Utc::now().timestamp();
                            let result = runner
                                .run(
                                    CheckpointKind::Crawl,
                                    record.head,
                                    record.remainder,
                                    ProbeSelection::validation_default(ProtocolHint::Auto),
                                    &UnconfiguredRenderer,
                                    now,
                                )
                                .await;
                            println!("crawl resumed: {} proxies scored", result.results.len());
                            leases.load().await.ok();
                        }
                        None => println!("no crawl checkpoint to resume"),
                    },
                    Err(e) => println!("checkpoint error: {e}"),
                }
            }
            "2" => match leases.load().await {
                Ok(()) => println!("lease index reloaded from store"),
                Err(e) => println!("reload failed: {e}"),
            },
            "3" => {
                let stats = leases.stats();
                println!(
                    "total={} idle={} busy={} dead={}",
                    stats.total, stats.idle, stats.busy, stats.dead
                );
            }
            "4" | "quit" | "q" => {
                signal.trip();
                return 0;
            }
            other => println!("unrecognized option: {other}"),
        }
    }
}

fn print_menu() {
    println!();
    println!("proxypool menu:");
    println!("  1) resume crawl checkpoint");
    println!("  2) reload lease index from store");
    println!("  3) show lease stats");
    println!("  4) quit");
    print!("> ");
    let _ = std::io::stdout().flush();
}
