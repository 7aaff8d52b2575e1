//! File-transfer application model: download providers and upload listeners.

use std::io::{self, Read, Write};

use tracing::debug;

/// Supplies the content of a client-initiated download.
///
/// Implementations are registered with a one-shot `Download` command; the
/// download service streams `write_to` output to the client with the headers
/// the other accessors describe.
pub trait DownloadProvider: Send + Sync {
    fn content_type(&self) -> &str {
        "application/octet-stream"
    }

    /// Suggested file name for the `Content-Disposition` header.
    fn file_name(&self) -> Option<&str> {
        None
    }

    /// Content length, when known up front.
    fn size(&self) -> Option<u64> {
        None
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// A provider backed by an in-memory byte buffer.
pub struct BytesDownloadProvider {
    content_type: String,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

impl BytesDownloadProvider {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            file_name: None,
            bytes,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

impl DownloadProvider for BytesDownloadProvider {
    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    fn size(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&self.bytes)
    }
}

/// A received upload, handed to the component's upload listener. The reader
/// drains the spooled payload; the spool file is deleted when the event is
/// dropped.
pub struct UploadEvent {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl UploadEvent {
    pub fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size as usize);
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Unicast listener for uploads targeting one upload-select component.
pub trait UploadListener: Send + Sync {
    /// A non-empty file was received.
    fn file_upload(&self, event: UploadEvent);

    /// The client submitted the form without a usable file (empty or absent).
    fn invalid_file_upload(&self, event: UploadEvent);
}

/// Routes a received upload to the correct listener callback: empty payloads
/// take the invalid path.
pub fn notify_upload(listener: &dyn UploadListener, event: UploadEvent) {
    if event.size == 0 {
        debug!("empty upload, notifying invalid-upload listener");
        listener.invalid_file_upload(event);
    } else {
        debug!(size = event.size, "upload received");
        listener.file_upload(event);
    }
}
