//! Built-in synchronize peers and command peers.

pub mod basic;
pub mod download;
pub mod text;
pub mod upload;

pub use basic::{ContentPanePeer, LabelPeer};
pub use download::{render_commands, FilePanePeer};
pub use text::TextComponentPeer;
pub use upload::UploadSelectPeer;

use trellis_app::ComponentKind;

use crate::peer::PeerRegistry;

/// A registry covering every built-in component kind.
pub fn default_registry() -> PeerRegistry {
    let mut registry = PeerRegistry::new();
    registry.register(ComponentKind::ContentPane, Box::new(ContentPanePeer));
    registry.register(ComponentKind::Label, Box::new(LabelPeer));
    registry.register(ComponentKind::TextField, Box::new(TextComponentPeer::new()));
    registry.register(ComponentKind::TextArea, Box::new(TextComponentPeer::new()));
    registry.register(ComponentKind::UploadSelect, Box::new(UploadSelectPeer));
    registry.register(ComponentKind::FilePane, Box::new(FilePanePeer));
    registry
}
