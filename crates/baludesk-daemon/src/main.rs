//! BaluDesk Daemon - background synchronization service
//!
//! Long-lived process started at login (systemd user service, launchd
//! agent, or Windows autostart). Wires the sync engine to its adapters:
//! SQLite store, BaluHost HTTP client, filesystem watchers, and the IPC
//! server the desktop UI connects to. Shutdown is signal-driven: SIGINT or
//! SIGTERM cancels the shared token, watchers are torn down, in-flight
//! transfers finish or time out, and the store flushes before exit.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use baludesk_core::config::Config;
use baludesk_core::ports::{
    Clock, CredentialStore, Notifier, RemoteClient, Sha256Hasher, StateStore, SystemClock,
};
use baludesk_ipc::{BroadcastNotifier, IpcServer};
use baludesk_remote::{HttpRemoteClient, KeyringCredentialStore};
use baludesk_store::{DatabasePool, SqliteStateStore};
use baludesk_sync::{ConflictResolver, IgnoreRules, SyncEngine, SyncScheduler, WatcherFacade};

/// Background sync daemon for BaluHost
#[derive(Debug, Parser)]
#[command(name = "baludeskd", version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Account username; its token is looked up in the system keyring
    #[arg(long)]
    username: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    info!(
        config = %config_path.display(),
        server = %config.server_url,
        interval = config.sync_interval,
        "BaluDesk daemon starting"
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    // Store.
    let pool = DatabasePool::open(&config.database_path)
        .await
        .context("could not open metadata store")?;
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

    // Remote client plus credentials from the platform secret store.
    let remote = Arc::new(
        HttpRemoteClient::new(config.server_url.clone(), config.transfer_hints())
            .context("could not build remote client")?,
    );
    if let Some(username) = &args.username {
        authenticate(remote.as_ref(), username).await;
    } else {
        warn!("No --username given; running unauthenticated until the UI logs in");
    }
    let remote: Arc<dyn RemoteClient> = remote;

    // Shared engine dependencies.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hasher = Arc::new(Sha256Hasher);
    let broadcast = BroadcastNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(broadcast.clone());

    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        remote.clone(),
        hasher.clone(),
        clock.clone(),
        notifier.clone(),
        &config,
        cancel.clone(),
    ));
    let resolver = Arc::new(ConflictResolver::new(
        store.clone(),
        remote,
        hasher,
        clock.clone(),
        notifier.clone(),
        cancel.clone(),
    ));

    // Watchers and the scheduling loop.
    let (watcher, watch_rx) = WatcherFacade::new(IgnoreRules::standard());
    let (scheduler, handle) = SyncScheduler::new(
        engine.clone(),
        store.clone(),
        notifier,
        watcher,
        watch_rx,
        std::time::Duration::from_secs(config.sync_interval),
        cancel.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    // IPC front door for the UI.
    let ipc = Arc::new(IpcServer::new(
        store,
        engine,
        resolver,
        handle,
        clock,
        config.conflict_resolution,
        broadcast.sender(),
        cancel.clone(),
    ));
    let ipc_port = config.ipc_port;
    let ipc_task = tokio::spawn(async move {
        if let Err(e) = ipc.serve(ipc_port).await {
            error!(error = %e, "IPC server failed");
        }
    });

    // Wait for shutdown, then drain in order: scheduler (tears the watchers
    // down), IPC, store.
    cancel.cancelled().await;
    info!("Shutting down");

    if let Err(e) = scheduler_task.await {
        warn!(error = %e, "Scheduler task did not exit cleanly");
    }
    if let Err(e) = ipc_task.await {
        warn!(error = %e, "IPC task did not exit cleanly");
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}

/// Installs the token from the keyring, or performs a first login when
/// `BALUDESK_PASSWORD` is provided (e.g. by a provisioning script)
async fn authenticate(remote: &HttpRemoteClient, username: &str) {
    let credentials = KeyringCredentialStore::new();

    match credentials.load_token(username) {
        Ok(Some(token)) => {
            remote.set_token(token);
            info!(username, "Token loaded from keyring");
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Keyring unavailable"),
    }

    let Ok(password) = std::env::var("BALUDESK_PASSWORD") else {
        warn!(
            username,
            "No stored token and no BALUDESK_PASSWORD; remote calls will fail until login"
        );
        return;
    };

    match remote.login(username, &password).await {
        Ok(token) => {
            if let Err(e) = credentials.save_token(username, &token) {
                warn!(error = %e, "Could not persist token to keyring");
            }
            info!(username, "Logged in to remote");
        }
        Err(e) => error!(username, error = %e, "Login failed"),
    }
}

/// Cancels the shared token on SIGINT or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    error!(error = %e, "Could not install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                _ = term.recv() => info!("SIGTERM received"),
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Could not wait for ctrl-c");
                return;
            }
            info!("Ctrl-C received");
        }
        cancel.cancel();
    });
}
