//! IPC service
//!
//! Accepts UI connections on localhost, reads one JSON request per line,
//! and answers each with one JSON response line. Engine events are fanned
//! out to every connected client through a broadcast channel; the same
//! channel backs the engine's [`Notifier`] port, so the core never knows
//! how many UIs are listening (or whether any are).

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use baludesk_core::domain::{ConflictPolicy, ConflictResolution, FolderId, SyncFolder};
use baludesk_core::ports::{Clock, EngineEvent, Notifier, StateStore};
use baludesk_sync::{ConflictResolver, SchedulerHandle, SyncEngine};

use crate::message::{Request, RequestPayload, Response};

/// Broadcast capacity; slow clients lag and drop events rather than
/// backpressuring the engine
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// [`Notifier`] that fans engine events out to connected IPC clients
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<EngineEvent>,
}

impl BroadcastNotifier {
    /// Creates the notifier and hands back the sender for the server
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    #[must_use]
    pub fn sender(&self) -> broadcast::Sender<EngineEvent> {
        self.tx.clone()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: EngineEvent) {
        // No receivers is normal (headless daemon); ignore the error.
        let _ = self.tx.send(event);
    }
}

/// The daemon's IPC front door
pub struct IpcServer {
    store: Arc<dyn StateStore>,
    engine: Arc<SyncEngine>,
    resolver: Arc<ConflictResolver>,
    scheduler: SchedulerHandle,
    clock: Arc<dyn Clock>,
    default_policy: ConflictPolicy,
    events: broadcast::Sender<EngineEvent>,
    cancel: CancellationToken,
}

impl IpcServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StateStore>,
        engine: Arc<SyncEngine>,
        resolver: Arc<ConflictResolver>,
        scheduler: SchedulerHandle,
        clock: Arc<dyn Clock>,
        default_policy: ConflictPolicy,
        events: broadcast::Sender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            engine,
            resolver,
            scheduler,
            clock,
            default_policy,
            events,
            cancel,
        }
    }

    /// Accept loop; returns when the cancellation token fires
    pub async fn serve(self: Arc<Self>, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("could not bind IPC port {port}"))?;
        info!(port, "IPC server listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "UI client connected");
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream).await;
                            debug!(%peer, "UI client disconnected");
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }

        info!("IPC server stopped");
        Ok(())
    }

    /// Serves one client: request/response lines interleaved with events
    pub async fn handle_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut events = self.events.subscribe();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let response = self.process_line(&line).await;
                        if write_json_line(&mut write, &response).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "IPC read failed");
                        break;
                    }
                },

                event = events.recv() => match event {
                    Ok(event) => {
                        if write_json_line(&mut write, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "IPC client lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Parses and dispatches one request line
    async fn process_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Malformed IPC request");
                return Response::failure(None, format!("malformed request: {e}"));
            }
        };

        let request_id = request.request_id.clone();
        match self.dispatch(request.payload).await {
            Ok(data) => Response::success(request_id, data),
            Err(e) => Response::failure(request_id, e.to_string()),
        }
    }

    /// Executes one request against the engine and store
    async fn dispatch(&self, payload: RequestPayload) -> Result<serde_json::Value> {
        match payload {
            RequestPayload::Ping => Ok(serde_json::json!({ "pong": true })),

            RequestPayload::AddSyncFolder {
                local_path,
                remote_path,
                conflict_resolution,
            } => {
                let policy = match conflict_resolution {
                    Some(raw) => raw.parse::<ConflictPolicy>()?,
                    None => self.default_policy,
                };
                let folder = SyncFolder::new(
                    std::path::PathBuf::from(local_path),
                    remote_path,
                    policy,
                    self.clock.now(),
                )?;
                self.store.add_folder(&folder).await?;
                info!(folder = %folder.id(), "Folder added via IPC");

                self.scheduler.refresh().await;
                self.scheduler.sync_now(Some(folder.id())).await;
                Ok(serde_json::to_value(&folder)?)
            }

            RequestPayload::RemoveSyncFolder { folder_id } => {
                self.require_folder(folder_id).await?;
                self.store.remove_folder(folder_id).await?;
                self.engine.forget_folder(folder_id);
                self.scheduler.refresh().await;
                info!(folder = %folder_id, "Folder removed via IPC");
                Ok(serde_json::json!({ "removed": folder_id }))
            }

            RequestPayload::UpdateSyncFolder {
                folder_id,
                enabled,
                remote_path,
                conflict_resolution,
            } => {
                let mut folder = self.require_folder(folder_id).await?;
                if let Some(enabled) = enabled {
                    folder.set_enabled(enabled);
                }
                if let Some(remote_path) = remote_path {
                    folder.set_remote_path(remote_path);
                }
                if let Some(raw) = conflict_resolution {
                    folder.set_policy(raw.parse::<ConflictPolicy>()?);
                }
                self.store.update_folder(&folder).await?;
                self.scheduler.refresh().await;
                Ok(serde_json::to_value(&folder)?)
            }

            RequestPayload::PauseSync { folder_id } => {
                match folder_id {
                    Some(folder) => self.engine.set_folder_paused(folder, true),
                    None => self.scheduler.pause(),
                }
                Ok(serde_json::json!({ "paused": true }))
            }

            RequestPayload::ResumeSync { folder_id } => {
                match folder_id {
                    Some(folder) => {
                        self.engine.set_folder_paused(folder, false);
                        self.scheduler.sync_now(Some(folder)).await;
                    }
                    None => {
                        self.scheduler.resume();
                        self.scheduler.sync_now(None).await;
                    }
                }
                Ok(serde_json::json!({ "paused": false }))
            }

            RequestPayload::GetSyncState { folder_id } => {
                let folders = match folder_id {
                    Some(id) => vec![self.require_folder(id).await?],
                    None => self.store.list_folders().await?,
                };

                let mut states = Vec::with_capacity(folders.len());
                for folder in folders {
                    states.push(self.folder_state(&folder).await?);
                }
                Ok(serde_json::json!({
                    "paused": self.scheduler.is_paused(),
                    "folders": states,
                }))
            }

            RequestPayload::GetFolders => {
                let folders = self.store.list_folders().await?;
                Ok(serde_json::to_value(&folders)?)
            }

            RequestPayload::GetPendingConflicts { folder_id } => {
                let conflicts = self.store.list_pending_conflicts(folder_id).await?;
                Ok(serde_json::to_value(&conflicts)?)
            }

            RequestPayload::ResolveConflict {
                conflict_id,
                resolution,
            } => {
                let resolution = resolution.parse::<ConflictResolution>()?;
                let conflict = self
                    .store
                    .get_conflict(conflict_id)
                    .await?
                    .with_context(|| format!("unknown conflict {conflict_id}"))?;

                self.resolver.apply(conflict_id, resolution).await?;
                // Let the next pass converge anything the resolution touched.
                self.scheduler.sync_now(Some(conflict.folder_id())).await;
                Ok(serde_json::json!({
                    "resolved": conflict_id,
                    "resolution": resolution,
                }))
            }
        }
    }

    async fn require_folder(&self, id: FolderId) -> Result<SyncFolder> {
        self.store
            .get_folder(id)
            .await?
            .with_context(|| format!("unknown folder {id}"))
    }

    /// The per-folder block of a `get_sync_state` response
    async fn folder_state(&self, folder: &SyncFolder) -> Result<serde_json::Value> {
        let state = self.store.get_sync_state(folder.id()).await?;
        let file_count = self.store.count_files(folder.id()).await?;
        let pending = self.store.list_pending_conflicts(Some(folder.id())).await?;
        let activity = self.store.list_activity(folder.id(), 20).await?;

        Ok(serde_json::json!({
            "folder": folder,
            "paused": self.engine.is_folder_paused(folder.id()),
            "last_sync": state.map(|s| s.last_sync()),
            "last_reconcile": state.and_then(|s| s.last_reconcile()),
            "file_count": file_count,
            "pending_conflicts": pending.len(),
            "recent_activity": activity,
        }))
    }
}

/// Writes one serialized value plus newline
async fn write_json_line<W, T>(write: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_vec(value).map_err(std::io::Error::other)?;
    line.push(b'\n');
    write.write_all(&line).await
}
