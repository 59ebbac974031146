//! IPC wire types
//!
//! Requests arrive as `{"type": "...", "payload": {...}, "requestId": "..."}`;
//! the `payload` shape depends on `type`. Responses echo the `requestId` so
//! the UI can correlate them with in-flight calls. Broadcast events reuse
//! [`EngineEvent`](baludesk_core::ports::EngineEvent)'s serialization
//! directly and carry no `requestId`.

use serde::{Deserialize, Serialize};

use baludesk_core::domain::newtypes::{ConflictId, FolderId};

/// The request types the core handles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RequestPayload {
    /// Liveness check
    Ping,
    /// Configure a new folder mapping
    AddSyncFolder {
        local_path: String,
        remote_path: String,
        /// Policy for the new folder; the config default applies when absent
        #[serde(default)]
        conflict_resolution: Option<String>,
    },
    /// Remove a mapping and all its state
    RemoveSyncFolder { folder_id: FolderId },
    /// Edit a mapping; absent fields stay unchanged
    UpdateSyncFolder {
        folder_id: FolderId,
        #[serde(default)]
        enabled: Option<bool>,
        #[serde(default)]
        remote_path: Option<String>,
        #[serde(default)]
        conflict_resolution: Option<String>,
    },
    /// Pause one folder, or everything when `folder_id` is absent
    PauseSync {
        #[serde(default)]
        folder_id: Option<FolderId>,
    },
    /// Resume one folder, or everything
    ResumeSync {
        #[serde(default)]
        folder_id: Option<FolderId>,
    },
    /// Per-folder status: cursor, counts, recent activity
    GetSyncState {
        #[serde(default)]
        folder_id: Option<FolderId>,
    },
    /// All configured folders
    GetFolders,
    /// Unresolved conflicts, optionally for one folder
    GetPendingConflicts {
        #[serde(default)]
        folder_id: Option<FolderId>,
    },
    /// Resolve a recorded conflict
    ResolveConflict {
        conflict_id: ConflictId,
        resolution: String,
    },
}

/// A complete request line
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(flatten)]
    pub payload: RequestPayload,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

/// A response line; `type` is always `"response"`
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    #[must_use]
    pub fn success(request_id: Option<String>, data: serde_json::Value) -> Self {
        Self {
            kind: "response",
            request_id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            kind: "response",
            request_id,
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping() {
        let request: Request =
            serde_json::from_str(r#"{"type": "ping", "requestId": "r1"}"#).unwrap();
        assert_eq!(request.payload, RequestPayload::Ping);
        assert_eq!(request.request_id.as_deref(), Some("r1"));
    }

    #[test]
    fn parses_add_sync_folder() {
        let request: Request = serde_json::from_str(
            r#"{
                "type": "add_sync_folder",
                "payload": {
                    "local_path": "/home/user/Sync",
                    "remote_path": "/team/docs",
                    "conflict_resolution": "keep_newest"
                }
            }"#,
        )
        .unwrap();

        match request.payload {
            RequestPayload::AddSyncFolder {
                local_path,
                remote_path,
                conflict_resolution,
            } => {
                assert_eq!(local_path, "/home/user/Sync");
                assert_eq!(remote_path, "/team/docs");
                assert_eq!(conflict_resolution.as_deref(), Some("keep_newest"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parses_pause_without_payload_fields() {
        let request: Request =
            serde_json::from_str(r#"{"type": "pause_sync", "payload": {}}"#).unwrap();
        assert_eq!(request.payload, RequestPayload::PauseSync { folder_id: None });
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"type": "reboot"}"#).is_err());
    }

    #[test]
    fn response_wire_shape() {
        let response = Response::success(Some("r7".to_string()), serde_json::json!({"pong": true}));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "response");
        assert_eq!(json["requestId"], "r7");
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["pong"], true);
        assert!(json.get("error").is_none());

        let failure = Response::failure(None, "no such folder");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "no such folder");
        assert!(json.get("requestId").is_none());
    }
}
