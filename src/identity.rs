use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Sender id stamped on optimistic messages while nobody is logged in. The
/// service never issues this id, and a confirmed message never carries it:
/// confirmed senders always come from the wire.
pub const ANONYMOUS_SENDER: &str = "anonymous-user";

/// Who is talking in this session: the authenticated user (if any) and the
/// server-issued guest session id (if one was handed out before login).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub auth_user_id: Option<String>,
    pub guest_session_id: Option<String>,
}

impl SessionIdentity {
    pub fn is_authenticated(&self) -> bool {
        self.auth_user_id.is_some()
    }

    /// Sender for optimistic messages: the authenticated user when available,
    /// then the server-issued guest session, then the anonymous placeholder
    /// the UI renders as "you".
    pub fn effective_sender_id(&self) -> &str {
        self.auth_user_id
            .as_deref()
            .or(self.guest_session_id.as_deref())
            .unwrap_or(ANONYMOUS_SENDER)
    }
}

/// Durable home for the guest session id so an anonymous exchange survives an
/// app restart until it is associated with an account.
///
/// Implementations are best effort: state in memory is authoritative, and
/// persistence failures must not take the send pipeline down.
pub trait GuestSessionStore: Send + Sync + 'static {
    fn get(&self) -> Option<String>;
    fn set(&self, guest_session_id: &str);
    fn remove(&self);
}

#[derive(Serialize, Deserialize, Default)]
struct GuestSessionFile {
    guest_session_id: Option<String>,
}

/// JSON-file-backed store under the app data dir.
pub struct FileGuestSessionStore {
    path: PathBuf,
}

impl FileGuestSessionStore {
    pub fn open(data_dir: &str) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {data_dir}"))?;
        Ok(Self {
            path: Path::new(data_dir).join("guest_session.json"),
        })
    }
}

impl GuestSessionStore for FileGuestSessionStore {
    fn get(&self) -> Option<String> {
        let bytes = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice::<GuestSessionFile>(&bytes) {
            Ok(file) => file.guest_session_id,
            Err(e) => {
                tracing::warn!(err = %e, "guest session file unreadable");
                None
            }
        }
    }

    fn set(&self, guest_session_id: &str) {
        let file = GuestSessionFile {
            guest_session_id: Some(guest_session_id.to_string()),
        };
        match serde_json::to_vec(&file) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(err = %e, "guest session write failed");
                }
            }
            Err(e) => tracing::warn!(err = %e, "guest session encode failed"),
        }
    }

    fn remove(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(err = %e, "guest session remove failed");
            }
        }
    }
}
