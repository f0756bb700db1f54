//! Durable session storage.
//!
//! One JSON document per session, named `{id}.json`, written by filling a
//! temporary file in the same directory, syncing it, and renaming it over the
//! target. Readers therefore see either the previous document or the new
//! one, never a partial write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use super::types::{Session, StatusCounts};
use crate::platform::ProviderKind;

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

const ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("session {session_id} is corrupt: {message}")]
    CorruptSession { session_id: Uuid, message: String },

    #[error("checkpoint I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    session: &'a Session,
}

#[derive(Deserialize)]
struct Document {
    version: u32,
    session: Session,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: Option<u32>,
}

/// One line of `sessions list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub provider: ProviderKind,
    pub organization: String,
    pub target_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub enumeration_complete: bool,
    pub counts: StatusCounts,
}

impl SessionSummary {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id,
            provider: session.request.provider,
            organization: session.request.organization.clone(),
            target_dir: session.request.target_dir.clone(),
            created_at: session.created_at,
            last_checkpoint_at: session.last_checkpoint_at,
            enumeration_complete: session.enumeration_complete,
            counts: session.counts(),
        }
    }
}

/// File-backed session store.
///
/// All operations are blocking; async callers go through
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// A store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn archive_dir(&self) -> PathBuf {
        self.dir.join(ARCHIVE_DIR)
    }

    /// Atomically replace the stored copy of `session`.
    pub fn save(&self, session: &Session) -> Result<(), CheckpointError> {
        let payload = Self::encode(session)?;
        self.write_encoded(session.id, &payload)
    }

    /// Serialize a session into its on-disk form.
    ///
    /// Split from [`write_encoded`](Self::write_encoded) so callers can
    /// serialize under a lock and write without it.
    pub fn encode(session: &Session) -> Result<Vec<u8>, CheckpointError> {
        Ok(serde_json::to_vec_pretty(&DocumentRef {
            version: CHECKPOINT_VERSION,
            session,
        })?)
    }

    pub fn write_encoded(&self, id: Uuid, payload: &[u8]) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;

        let target = self.path_for(id);
        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;
        tmp.write_all(payload)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CheckpointError::io(tmp.path(), e))?;
        tmp.persist(&target)
            .map_err(|e| CheckpointError::io(&target, e.error))?;

        tracing::trace!(session = %id, bytes = payload.len(), "Checkpoint written");
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<Session, CheckpointError> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckpointError::SessionNotFound(id));
            }
            Err(e) => return Err(CheckpointError::io(&path, e)),
        };
        decode(id, &bytes)
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.path_for(id).is_file()
    }

    pub fn delete(&self, id: Uuid) -> Result<(), CheckpointError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CheckpointError::SessionNotFound(id)),
            Err(e) => Err(CheckpointError::io(&path, e)),
        }
    }

    /// Move a finished session out of the active set.
    pub fn archive(&self, id: Uuid) -> Result<PathBuf, CheckpointError> {
        let source = self.path_for(id);
        if !source.is_file() {
            return Err(CheckpointError::SessionNotFound(id));
        }
        let archive = self.archive_dir();
        fs::create_dir_all(&archive).map_err(|e| CheckpointError::io(&archive, e))?;
        let dest = archive.join(format!("{id}.json"));
        fs::rename(&source, &dest).map_err(|e| CheckpointError::io(&source, e))?;
        Ok(dest)
    }

    /// Summaries of all active sessions, newest first.
    ///
    /// Unreadable documents are logged and left out.
    pub fn list(&self) -> Result<Vec<SessionSummary>, CheckpointError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CheckpointError::io(&self.dir, e)),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.dir, e))?;
            let path = entry.path();
            let Some(id) = session_id_of(&path) else {
                continue;
            };
            match self.load(id) {
                Ok(session) => summaries.push(SessionSummary::of(&session)),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable session: {e}"),
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    /// The unfinished session for this provider, organization and target, if
    /// any.
    pub fn find_active(
        &self,
        provider: ProviderKind,
        organization: &str,
        target_dir: &Path,
    ) -> Result<Option<SessionSummary>, CheckpointError> {
        Ok(self.list()?.into_iter().find(|s| {
            s.provider == provider && s.organization == organization && s.target_dir == target_dir
        }))
    }
}

fn session_id_of(path: &Path) -> Option<Uuid> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn decode(id: Uuid, bytes: &[u8]) -> Result<Session, CheckpointError> {
    let corrupt = |message: String| CheckpointError::CorruptSession {
        session_id: id,
        message,
    };

    let header: VersionHeader = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    match header.version {
        Some(CHECKPOINT_VERSION) => {}
        Some(other) => return Err(corrupt(format!("unsupported checkpoint version {other}"))),
        None => return Err(corrupt("missing checkpoint version".to_string())),
    }

    let document: Document = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    debug_assert_eq!(document.version, CHECKPOINT_VERSION);
    if document.session.id != id {
        return Err(corrupt(format!(
            "document holds session {}",
            document.session.id
        )));
    }
    Ok(document.session)
}
