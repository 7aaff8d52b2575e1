//! Trellis synchronization protocol types.
//!
//! This crate is the single source of truth for the wire format exchanged
//! between the server-side component framework and the browser client:
//! the outgoing `ServerMessage` directive encoding, the incoming client
//! changeset, service/processor name constants, and the error taxonomy.

pub mod client;
pub mod error;
pub mod message;
pub mod names;

pub use client::{ClientAction, ClientMessage, ClientPropertyUpdate};
pub use error::SyncError;
pub use message::{
    DirectiveGroup, DirectiveItem, ServerMessage, WireDirective, WireGroup, WireMessage,
};
pub use names::{Processors, Services};
