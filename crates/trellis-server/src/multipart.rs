//! Pluggable multipart parsing with a disk-spooling default.
//!
//! The strategy is set once per server context: installing the same strategy
//! again is a no-op, installing a different one is a configuration error.
//! The default strategy holds small payloads in memory and spills anything
//! over the threshold to a temp file, enforcing an overall size cap.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::Multipart;
use parking_lot::RwLock;
use tracing::debug;

use trellis_container::{PendingUpload, UploadSpool};
use trellis_protocol::SyncError;

/// Payloads at or below this stay in memory.
pub const DEFAULT_MEMORY_THRESHOLD: usize = 16 * 1024;

/// Hard cap on accepted upload size.
pub const DEFAULT_SIZE_LIMIT: usize = 128 * 1024 * 1024;

/// Name of the file input in the rendered upload form.
pub const FILE_FIELD: &str = "file";

/// Parses a multipart upload request into a spooled pending upload.
pub trait MultipartStrategy: Send + Sync + 'static {
    /// Identity used by the set-once rule.
    fn name(&self) -> &'static str;

    fn parse<'a>(
        &'a self,
        multipart: Multipart,
    ) -> Pin<Box<dyn Future<Output = Result<PendingUpload, SyncError>> + Send + 'a>>;
}

/// Set-once strategy holder.
#[derive(Default)]
pub struct MultipartConfig {
    strategy: RwLock<Option<Arc<dyn MultipartStrategy>>>,
}

impl MultipartConfig {
    /// Installs a strategy. Re-installing a strategy of the same name is
    /// ignored; a differently-named strategy after the first is rejected.
    pub fn install(&self, strategy: Arc<dyn MultipartStrategy>) -> Result<(), SyncError> {
        let mut guard = self.strategy.write();
        match guard.as_ref() {
            None => {
                debug!(strategy = strategy.name(), "multipart strategy installed");
                *guard = Some(strategy);
                Ok(())
            }
            Some(existing) if existing.name() == strategy.name() => Ok(()),
            Some(existing) => Err(SyncError::Configuration(format!(
                "multipart strategy already set to {:?}, cannot replace with {:?}",
                existing.name(),
                strategy.name()
            ))),
        }
    }

    /// The installed strategy, defaulting to disk spooling on first use.
    pub fn strategy(&self) -> Arc<dyn MultipartStrategy> {
        if let Some(strategy) = self.strategy.read().as_ref() {
            return strategy.clone();
        }
        let mut guard = self.strategy.write();
        guard
            .get_or_insert_with(|| Arc::new(DiskSpoolStrategy::default()) as Arc<dyn MultipartStrategy>)
            .clone()
    }

    pub fn size_limit(&self) -> usize {
        DEFAULT_SIZE_LIMIT
    }
}

/// The default strategy: memory below the threshold, temp file beyond it.
pub struct DiskSpoolStrategy {
    pub memory_threshold: usize,
    pub size_limit: usize,
}

impl Default for DiskSpoolStrategy {
    fn default() -> Self {
        Self {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }
}

impl DiskSpoolStrategy {
    async fn parse_inner(&self, mut multipart: Multipart) -> Result<PendingUpload, SyncError> {
        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| SyncError::MultipartParse(e.to_string()))?
        {
            if field.name() != Some(FILE_FIELD) {
                continue;
            }
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            let mut memory: Vec<u8> = Vec::new();
            let mut disk: Option<tempfile::NamedTempFile> = None;
            let mut size: usize = 0;

            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| SyncError::MultipartParse(e.to_string()))?
            {
                size += chunk.len();
                if size > self.size_limit {
                    return Err(SyncError::UploadSizeExceeded {
                        limit: self.size_limit,
                    });
                }
                match disk.as_mut() {
                    Some(file) => file.write_all(&chunk)?,
                    None if size > self.memory_threshold => {
                        // Crossed the threshold: spill what we have plus this
                        // chunk to a temp file.
                        let mut file = tempfile::NamedTempFile::new()?;
                        file.write_all(&memory)?;
                        file.write_all(&chunk)?;
                        memory.clear();
                        disk = Some(file);
                    }
                    None => memory.extend_from_slice(&chunk),
                }
            }

            let spool = match disk {
                Some(file) => {
                    debug!(size, "upload spooled to disk");
                    UploadSpool::Disk(file)
                }
                None => UploadSpool::Memory(memory),
            };
            return Ok(PendingUpload {
                file_name,
                content_type,
                size: size as u64,
                spool,
            });
        }
        Err(SyncError::MultipartParse(
            "request carries no file field".into(),
        ))
    }
}

impl MultipartStrategy for DiskSpoolStrategy {
    fn name(&self) -> &'static str {
        "disk-spool"
    }

    fn parse<'a>(
        &'a self,
        multipart: Multipart,
    ) -> Pin<Box<dyn Future<Output = Result<PendingUpload, SyncError>> + Send + 'a>> {
        Box::pin(self.parse_inner(multipart))
    }
}
