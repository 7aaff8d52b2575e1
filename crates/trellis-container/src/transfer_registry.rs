//! Process-wide registry of in-flight file transfers.
//!
//! Three kinds of entries live here, each with an explicit add and remove:
//! single-use download transfers (registered when a `Download` command
//! renders, removed when served), pending uploads (spooled multipart payloads
//! awaiting the client's follow-up action, keyed by the upload component's
//! element id), and file-pane providers (long-lived, keyed by element id,
//! removed when the component is disposed).
//!
//! Element ids are only unique within one session (every tree counts from
//! `c_0`), so upload and file-pane entries are keyed under a per-session
//! scope: each container instance works through a [`TransferRegistry::scoped`]
//! handle, and one session can never read or clobber another's entries.
//! Download transfer ids are process-unique uuids and need no scope.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use trellis_app::transfer::{DownloadProvider, UploadEvent};

/// Where a received upload payload is held until the client's action
/// consumes it. Disk spools are temp files deleted on drop, so abandoning a
/// pending upload never leaks a file.
pub enum UploadSpool {
    Memory(Vec<u8>),
    Disk(tempfile::NamedTempFile),
}

impl UploadSpool {
    fn into_reader(self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(Cursor::new(bytes))),
            Self::Disk(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                Ok(Box::new(file))
            }
        }
    }
}

/// A spooled upload waiting for its component's follow-up action.
pub struct PendingUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub spool: UploadSpool,
}

impl PendingUpload {
    /// Converts the pending upload into a listener event. The spool travels
    /// with the event's reader and is cleaned up when the event is dropped.
    pub fn into_event(self) -> io::Result<UploadEvent> {
        Ok(UploadEvent {
            file_name: self.file_name,
            content_type: self.content_type,
            size: self.size,
            reader: self.spool.into_reader()?,
        })
    }
}

/// Concurrent transfer tables, shared by reference across sessions and
/// request handlers. Cloning a handle keeps its scope; [`Self::scoped`]
/// derives a handle with a fresh scope for a new session.
#[derive(Clone, Default)]
pub struct TransferRegistry {
    scope: String,
    downloads: Arc<DashMap<String, Arc<dyn DownloadProvider>>>,
    uploads: Arc<DashMap<String, PendingUpload>>,
    file_panes: Arc<DashMap<String, Arc<dyn DownloadProvider>>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a handle over the same tables whose upload and file-pane
    /// entries are isolated from every other scope. One of these is handed
    /// to each container instance at creation.
    pub fn scoped(&self) -> Self {
        Self {
            scope: Uuid::new_v4().to_string(),
            downloads: Arc::clone(&self.downloads),
            uploads: Arc::clone(&self.uploads),
            file_panes: Arc::clone(&self.file_panes),
        }
    }

    fn scoped_key(&self, element_id: &str) -> String {
        format!("{}/{element_id}", self.scope)
    }

    /// Registers a single-use download and returns its transfer id.
    pub fn register_download(&self, provider: Arc<dyn DownloadProvider>) -> String {
        let id = Uuid::new_v4().to_string();
        self.downloads.insert(id.clone(), provider);
        debug!(transfer_id = %id, "download transfer registered");
        id
    }

    /// Claims a download transfer. The entry is removed: a transfer id is
    /// valid for exactly one fetch.
    pub fn take_download(&self, id: &str) -> Option<Arc<dyn DownloadProvider>> {
        self.downloads.remove(id).map(|(_, provider)| provider)
    }

    pub fn remove_download(&self, id: &str) {
        self.downloads.remove(id);
    }

    /// Records a received upload for the component with the given element id.
    /// An earlier unconsumed upload for the same component is replaced (and
    /// its spool dropped).
    pub fn set_pending_upload(&self, element_id: &str, upload: PendingUpload) {
        debug!(element_id, size = upload.size, "pending upload recorded");
        self.uploads.insert(self.scoped_key(element_id), upload);
    }

    pub fn take_pending_upload(&self, element_id: &str) -> Option<PendingUpload> {
        self.uploads
            .remove(&self.scoped_key(element_id))
            .map(|(_, upload)| upload)
    }

    pub fn remove_pending_upload(&self, element_id: &str) {
        self.uploads.remove(&self.scoped_key(element_id));
    }

    pub fn register_file_pane(&self, element_id: &str, provider: Arc<dyn DownloadProvider>) {
        self.file_panes.insert(self.scoped_key(element_id), provider);
    }

    /// File-pane lookups do not consume the entry; the frame may be reloaded.
    pub fn file_pane(&self, element_id: &str) -> Option<Arc<dyn DownloadProvider>> {
        self.file_panes
            .get(&self.scoped_key(element_id))
            .map(|entry| entry.value().clone())
    }

    pub fn remove_file_pane(&self, element_id: &str) {
        self.file_panes.remove(&self.scoped_key(element_id));
    }
}
