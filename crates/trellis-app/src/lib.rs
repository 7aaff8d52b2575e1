//! Trellis application-facing component model.
//!
//! A Trellis application is a server-side tree of stateful components. This
//! crate provides the tree itself (arena storage, stable render identities),
//! the update manager that accumulates the per-cycle changeset, application
//! commands, the file-transfer listener/provider model, and task-queue
//! callback intervals. Nothing here touches HTTP; the container and server
//! crates drive these types.

pub mod command;
pub mod tasks;
pub mod transfer;
pub mod tree;
pub mod update;

pub use command::{Command, CommandQueue, Cookie};
pub use tasks::TaskQueues;
pub use transfer::{
    notify_upload, BytesDownloadProvider, DownloadProvider, UploadEvent, UploadListener,
};
pub use tree::{
    ActionListener, ComponentId, ComponentKind, ComponentTree, RemovedComponent, TreeSnapshot,
};
pub use update::{
    apply_client_action, apply_client_update, coerce_scroll_offset, Changeset, PropertyChange,
    ServerComponentUpdate, UpdateManager,
};
