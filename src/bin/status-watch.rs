//! Terminal status widget: polls the status API and prints the portal status
//! in English or Bengali.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::info;

use portal_status::clock::SystemClock;
use portal_status::poller::display::TerminalDisplay;
use portal_status::poller::i18n::Language;
use portal_status::poller::store::JsonFileStore;
use portal_status::poller::{HttpStatusSource, Poller, PollerConfig};

#[derive(Parser, Debug)]
#[command(name = "status-watch")]
#[command(about = "Watch the submission portal status from a terminal (SIGUSR2 checks now, SIGUSR1 pauses)")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Status API endpoint (or a static status.json)
    #[arg(long, default_value = "http://localhost:3000/api/status")]
    endpoint: String,

    /// Seconds between checks
    #[arg(long, default_value_t = 30)]
    interval_secs: u64,

    /// Seconds before a check counts as offline
    #[arg(long, default_value_t = 15)]
    timeout_secs: u64,

    /// Where the last status and language preference are kept
    #[arg(long, default_value = ".status-watch.json")]
    state_file: PathBuf,

    /// Switch display language (en or bn); remembered for later runs
    #[arg(long)]
    lang: Option<Language>,

    /// Check once and exit
    #[arg(long)]
    once: bool,

    /// Only show that status checking is disabled
    #[arg(long)]
    disabled: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = PollerConfig::new(args.endpoint.clone());
    config.check_interval = Duration::from_secs(args.interval_secs.max(1));
    config.request_timeout = Duration::from_secs(args.timeout_secs.max(1));
    config.enabled = !args.disabled;

    let source = HttpStatusSource::from_config(&config)
        .context("Failed to build HTTP client")?;
    let store = JsonFileStore::open(&args.state_file)
        .with_context(|| format!("Failed to open state file {:?}", args.state_file))?;

    let mut poller = Poller::new(
        config,
        Arc::new(source),
        TerminalDisplay::new(std::io::stdout()),
        store,
        Arc::new(SystemClock),
    );

    if let Some(lang) = args.lang {
        poller.set_language(lang);
    }

    if args.once {
        poller.mount().await;
        return Ok(());
    }

    let (visible_tx, visible_rx) = watch::channel(true);
    spawn_visibility_toggle(visible_tx);
    let refresh_rx = spawn_refresh_signal();

    poller
        .run(visible_rx, refresh_rx, async {
            let _ = signal::ctrl_c().await;
        })
        .await;

    info!("Bye.");
    Ok(())
}

/// SIGUSR2 asks for a check right away.
#[cfg(unix)]
fn spawn_refresh_signal() -> mpsc::Receiver<()> {
    use signal::unix::{signal, SignalKind};

    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::user_defined2()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("SIGUSR2 unavailable, manual refresh disabled: {}", e);
                return;
            }
        };
        while stream.recv().await.is_some() {
            // A refresh already queued covers this one.
            if let Err(mpsc::error::TrySendError::Closed(())) = refresh_tx.try_send(()) {
                break;
            }
        }
    });
    refresh_rx
}

#[cfg(not(unix))]
fn spawn_refresh_signal() -> mpsc::Receiver<()> {
    let (_refresh_tx, refresh_rx) = mpsc::channel(1);
    refresh_rx
}

/// SIGUSR1 pauses and resumes polling, the terminal's stand-in for a hidden tab.
#[cfg(unix)]
fn spawn_visibility_toggle(visible: watch::Sender<bool>) {
    use signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("SIGUSR1 unavailable, polling cannot be paused: {}", e);
                // Keep the sender alive so the poller keeps running.
                std::future::pending::<()>().await;
                return;
            }
        };
        while stream.recv().await.is_some() {
            visible.send_modify(|v| *v = !*v);
            info!("Polling {}", if *visible.borrow() { "resumed" } else { "paused" });
        }
    });
}

#[cfg(not(unix))]
fn spawn_visibility_toggle(visible: watch::Sender<bool>) {
    tokio::spawn(async move {
        std::future::pending::<()>().await;
        drop(visible);
    });
}
