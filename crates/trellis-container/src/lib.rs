//! Trellis container: the per-session synchronization engine.
//!
//! A `ContainerInstance` binds one application to one session: it owns the
//! component tree, render state, task queues, and command queue, and walks a
//! lifecycle of init, passivate/reactivate, dispose. Rendering is driven by
//! the `PeerRegistry`, which maps component kinds to synchronize peers and
//! decides, per changed component, between a partial update and a full
//! replace. The `TransferRegistry` tracks in-flight uploads and single-use
//! downloads across requests.

pub mod instance;
pub mod partial;
pub mod peer;
pub mod peers;
pub mod transfer_registry;

pub use instance::{
    ApplicationDelegate, AppContext, ContainerInstance, ContainerSnapshot, LifecycleState,
};
pub use partial::{PartialUpdateManager, PartialUpdateParticipant};
pub use peer::{CycleOutput, InputContext, PeerRegistry, RenderContext, SyncPeer};
pub use transfer_registry::{PendingUpload, TransferRegistry, UploadSpool};
