//! Partial update participants.
//!
//! A peer that can patch individual properties on the client registers one
//! participant per property name. The manager only processes an update when
//! every changed property has an applicable participant; otherwise the whole
//! component falls back to a full replace.

use trellis_app::update::{PropertyChange, ServerComponentUpdate};
use trellis_protocol::SyncError;

use crate::peer::RenderContext;

/// Renders one property's change as a client-side patch.
pub trait PartialUpdateParticipant: Send + Sync {
    /// Whether the participant can currently patch this property. Peers use
    /// render state here, e.g. to refuse patching text that was suppressed
    /// in the last full render.
    fn can_render(&self, ctx: &RenderContext<'_>, update: &ServerComponentUpdate) -> bool {
        let _ = (ctx, update);
        true
    }

    fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        update: &ServerComponentUpdate,
        change: &PropertyChange,
    ) -> Result<(), SyncError>;
}

/// Ordered property-name registry of participants for one peer.
#[derive(Default)]
pub struct PartialUpdateManager {
    participants: Vec<(String, Box<dyn PartialUpdateParticipant>)>,
}

impl PartialUpdateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        property: impl Into<String>,
        participant: Box<dyn PartialUpdateParticipant>,
    ) {
        self.participants.push((property.into(), participant));
    }

    /// True only if every changed property has a registered participant that
    /// is currently applicable.
    pub fn can_process(&self, ctx: &RenderContext<'_>, update: &ServerComponentUpdate) -> bool {
        update.changed_properties().all(|name| {
            self.participants
                .iter()
                .find(|(p, _)| p == name)
                .map(|(_, participant)| participant.can_render(ctx, update))
                .unwrap_or(false)
        })
    }

    /// Renders every change of the update. Participants run in registration
    /// order; call only after `can_process` returned true this cycle.
    pub fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        update: &ServerComponentUpdate,
    ) -> Result<(), SyncError> {
        for (property, participant) in &self.participants {
            if let Some(change) = update.properties.iter().find(|c| &c.name == property) {
                participant.render(ctx, update, change)?;
            }
        }
        Ok(())
    }
}
