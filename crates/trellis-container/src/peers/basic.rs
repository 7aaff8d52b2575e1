//! Peers for structural components with no client-side state of their own.

use trellis_app::{ComponentId, RemovedComponent};
use trellis_protocol::{DirectiveGroup, DirectiveItem, Processors, SyncError};

use crate::peer::{RenderContext, SyncPeer};

pub(crate) fn dom_add_item(
    element_id: &str,
    parent_element_id: Option<&str>,
    kind: &str,
) -> DirectiveItem {
    let mut item = DirectiveItem::for_element(element_id).attr("type", kind);
    if let Some(parent) = parent_element_id {
        item = item.attr("parent", parent);
    }
    item
}

/// The root container. Purely structural; disposal is the DOM removal the
/// registry emits.
pub struct ContentPanePeer;

impl SyncPeer for ContentPanePeer {
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(id)?;
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::DOM,
            "dom-add",
            dom_add_item(&eid, parent_element_id, "ContentPane"),
        );
        Ok(())
    }

    fn render_dispose(&self, _ctx: &mut RenderContext<'_>, _removed: &RemovedComponent) {}
}

/// Static text. Content changes re-render the whole element; labels are
/// cheap enough that a partial path is not worth carrying.
pub struct LabelPeer;

impl SyncPeer for LabelPeer {
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(id)?;
        let text = ctx
            .tree
            .property(id, "text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::DOM,
            "dom-add",
            dom_add_item(&eid, parent_element_id, "Label").attr("text", text),
        );
        Ok(())
    }

    fn render_dispose(&self, _ctx: &mut RenderContext<'_>, _removed: &RemovedComponent) {}
}
