//! Peer for the upload-select component.
//!
//! The component renders as an iframe sourcing the upload form service. A
//! multipart POST to the receiver service spools the payload and records it
//! in the transfer registry under the component's element id; the client
//! then fires an `upload` action, at which point this peer claims the
//! pending payload and streams it into the component's upload listener. The
//! spool file is deleted when the event is dropped, consumed or not.

use tracing::warn;

use trellis_app::transfer::notify_upload;
use trellis_app::{ComponentId, RemovedComponent};
use trellis_protocol::{
    ClientAction, DirectiveGroup, DirectiveItem, Processors, Services, SyncError,
};

use crate::peer::{InputContext, RenderContext, SyncPeer};
use crate::peers::basic::dom_add_item;

/// Action name the client fires after a completed upload POST.
pub const UPLOAD_ACTION: &str = "upload";

pub struct UploadSelectPeer;

impl SyncPeer for UploadSelectPeer {
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(id)?;
        ctx.message.add_library(Processors::UPLOAD);
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::DOM,
            "dom-add",
            dom_add_item(&eid, parent_element_id, "UploadSelect"),
        );

        let mut init = DirectiveItem::for_element(&eid).attr(
            "form-uri",
            format!("?serviceId={}&eid={eid}", Services::UPLOAD_FORM),
        );
        for prop in ["send-button-text", "wait-text"] {
            if let Some(text) = ctx.tree.property(id, prop).and_then(|v| v.as_str()) {
                init = init.attr(prop, text);
            }
        }
        ctx.message
            .add_item(DirectiveGroup::PostUpdate, Processors::UPLOAD, "init", init);
        Ok(())
    }

    fn render_dispose(&self, ctx: &mut RenderContext<'_>, removed: &RemovedComponent) {
        if let Some(eid) = &removed.element_id {
            // Drop any unconsumed spooled payload with the component.
            ctx.transfers.remove_pending_upload(eid);
            ctx.message.add_item(
                DirectiveGroup::PreRemove,
                Processors::UPLOAD,
                "dispose",
                DirectiveItem::for_element(eid.clone()),
            );
        }
    }

    fn process_action(
        &self,
        ctx: &mut InputContext<'_>,
        action: &ClientAction,
    ) -> Result<(), SyncError> {
        if action.name != UPLOAD_ACTION {
            return trellis_app::update::apply_client_action(ctx.tree, action);
        }
        let id = ctx
            .tree
            .component_by_element_id(&action.component_id)
            .ok_or_else(|| SyncError::StaleComponent(action.component_id.clone()))?;
        let Some(pending) = ctx.transfers.take_pending_upload(&action.component_id) else {
            warn!(
                element_id = %action.component_id,
                "upload action with no pending payload"
            );
            return Ok(());
        };
        match ctx.tree.upload_listener(id) {
            Some(listener) => {
                let event = pending.into_event()?;
                notify_upload(listener.as_ref(), event);
            }
            None => {
                warn!(
                    element_id = %action.component_id,
                    "upload received by a component with no listener, payload discarded"
                );
            }
        }
        Ok(())
    }
}
