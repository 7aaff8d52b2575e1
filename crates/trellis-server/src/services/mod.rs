//! Built-in framework services.

pub mod sync;
pub mod transfer;

pub use sync::{DefaultService, NewInstanceService, SessionExpiredService, SynchronizeService};
pub use transfer::{DownloadService, FilePaneService, UploadFormService};

use crate::registry::ServiceRegistry;

/// Registers every built-in service. The upload receiver is not listed: the
/// front controller dispatches it directly so it can stream the multipart
/// body instead of buffering it.
pub fn register_builtin(services: &ServiceRegistry) {
    services.register(NewInstanceService);
    services.register(DefaultService);
    services.register(SynchronizeService);
    services.register(SessionExpiredService);
    services.register(DownloadService);
    services.register(UploadFormService);
    services.register(FilePaneService);
}
