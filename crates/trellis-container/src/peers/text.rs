//! Peer for text-input components (single-line fields and text areas).
//!
//! Text and scroll positions are patched partially; anything else, including
//! enabling or disabling the component, re-renders the element. The peer
//! keeps one piece of render state: whether the last full render suppressed
//! the text of a disabled component. While suppressed, a text patch cannot
//! be rendered partially (the client has no text node to patch), so the
//! participant refuses and the registry falls back to a full replace.

use serde_json::Value;

use trellis_app::update::{PropertyChange, ServerComponentUpdate};
use trellis_app::{ComponentId, RemovedComponent};
use trellis_protocol::{DirectiveGroup, DirectiveItem, Processors, SyncError};

use crate::partial::{PartialUpdateManager, PartialUpdateParticipant};
use crate::peer::{RenderContext, SyncPeer};
use crate::peers::basic::dom_add_item;

struct TextRenderState {
    text_suppressed: bool,
}

fn attr_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_enabled(ctx: &RenderContext<'_>, id: ComponentId) -> bool {
    ctx.tree
        .property(id, "enabled")
        .and_then(|v| v.as_bool())
        .unwrap_or(true)
}

struct TextParticipant;

impl PartialUpdateParticipant for TextParticipant {
    fn can_render(&self, ctx: &RenderContext<'_>, update: &ServerComponentUpdate) -> bool {
        !ctx.render_state_of::<TextRenderState>(update.id)
            .map(|s| s.text_suppressed)
            .unwrap_or(false)
    }

    fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        update: &ServerComponentUpdate,
        change: &PropertyChange,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(update.id)?;
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::TEXT_COMPONENT,
            "set-text",
            DirectiveItem::for_element(eid).attr("text", attr_string(&change.new)),
        );
        Ok(())
    }
}

struct ScrollParticipant {
    direction: &'static str,
}

impl PartialUpdateParticipant for ScrollParticipant {
    fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        update: &ServerComponentUpdate,
        change: &PropertyChange,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(update.id)?;
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::TEXT_COMPONENT,
            "set-scroll",
            DirectiveItem::for_element(eid)
                .attr("direction", self.direction)
                .attr("position", attr_string(&change.new)),
        );
        Ok(())
    }
}

pub struct TextComponentPeer {
    partials: PartialUpdateManager,
}

impl TextComponentPeer {
    pub fn new() -> Self {
        let mut partials = PartialUpdateManager::new();
        partials.add("text", Box::new(TextParticipant));
        partials.add(
            "horizontal-scroll",
            Box::new(ScrollParticipant {
                direction: "horizontal",
            }),
        );
        partials.add(
            "vertical-scroll",
            Box::new(ScrollParticipant {
                direction: "vertical",
            }),
        );
        Self { partials }
    }
}

impl Default for TextComponentPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncPeer for TextComponentPeer {
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let eid = ctx.tree.element_id(id)?;
        let kind = ctx.tree.kind(id)?;
        ctx.message.add_library(Processors::TEXT_COMPONENT);
        ctx.message.add_item(
            DirectiveGroup::Update,
            Processors::DOM,
            "dom-add",
            dom_add_item(&eid, parent_element_id, kind.as_str()),
        );

        let enabled = is_enabled(ctx, id);
        let mut init = DirectiveItem::for_element(&eid);
        if enabled {
            if let Some(text) = ctx.tree.property(id, "text") {
                init = init.attr("text", attr_string(text));
            }
        } else {
            init = init.attr("enabled", "false");
        }
        for scroll in ["horizontal-scroll", "vertical-scroll"] {
            if let Some(value) = ctx.tree.property(id, scroll) {
                init = init.attr(scroll, attr_string(value));
            }
        }
        ctx.message.add_item(
            DirectiveGroup::PostUpdate,
            Processors::TEXT_COMPONENT,
            "init",
            init,
        );

        ctx.set_render_state(
            id,
            Box::new(TextRenderState {
                text_suppressed: !enabled,
            }),
        );
        Ok(())
    }

    fn render_dispose(&self, ctx: &mut RenderContext<'_>, removed: &RemovedComponent) {
        if let Some(eid) = &removed.element_id {
            ctx.message.add_item(
                DirectiveGroup::PreRemove,
                Processors::TEXT_COMPONENT,
                "dispose",
                DirectiveItem::for_element(eid.clone()),
            );
        }
    }

    fn partial_updates(&self) -> Option<&PartialUpdateManager> {
        Some(&self.partials)
    }
}
