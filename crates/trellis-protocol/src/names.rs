//! Service and client-processor name constants.
//!
//! Each constant is the exact string sent over the wire, either as the
//! `serviceId` query parameter of a request or as the `processor` field of a
//! directive batch.

/// Identifiers of the built-in HTTP services.
pub struct Services;

impl Services {
    /// Rendered when a request carries no service id and no session exists.
    pub const NEW_INSTANCE: &str = "Trellis.NewInstance";
    /// Rendered when a request carries no service id but a session exists.
    pub const DEFAULT: &str = "Trellis.Default";
    /// Rendered when a request carries a service id but no session exists.
    pub const SESSION_EXPIRED: &str = "Trellis.Expired";
    /// Client/server state synchronization endpoint.
    pub const SYNCHRONIZE: &str = "Trellis.Sync";
    /// Streams a registered download transfer.
    pub const DOWNLOAD: &str = "Trellis.Download";
    /// Renders the upload form page for an upload-select component.
    pub const UPLOAD_FORM: &str = "Trellis.UploadForm";
    /// Receives a multipart upload POST.
    pub const UPLOAD_RECEIVER: &str = "Trellis.Upload";
    /// Streams a file-pane component's provider content.
    pub const FILE_PANE: &str = "Trellis.FilePane";
}

/// Identifiers of the client-side directive processors.
///
/// Directives within a group batch under `(processor, operation)` so the
/// client dispatch table applies one handler to many items in a single pass.
pub struct Processors;

impl Processors {
    /// Structural DOM manipulation (element add/remove).
    pub const DOM: &str = "Trellis.Dom";
    /// Text component state (init, dispose, set-text, scroll).
    pub const TEXT_COMPONENT: &str = "Trellis.TextComponent";
    /// Upload-select iframe management.
    pub const UPLOAD: &str = "Trellis.Upload";
    /// Client-initiated file download.
    pub const DOWNLOAD: &str = "Trellis.Download";
    /// Generic per-element style patches.
    pub const STYLE: &str = "Trellis.Style";
}
