//! Synchronize peers and the kind-keyed dispatch registry.
//!
//! One peer serves all components of a kind. The registry owns the
//! full-versus-partial decision: a structural change, a peer without partial
//! support, or a single changed property lacking an applicable participant
//! all force a full replace of that component on the client. The decision is
//! all-or-nothing per component per cycle.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use trellis_app::update::{self, Changeset};
use trellis_app::{ComponentId, ComponentKind, ComponentTree, Cookie, RemovedComponent};
use trellis_protocol::{ClientAction, DirectiveGroup, DirectiveItem, Processors, ServerMessage, SyncError};

use crate::partial::PartialUpdateManager;
use crate::transfer_registry::TransferRegistry;

/// Disjoint borrows of everything a peer may touch while rendering.
pub struct RenderContext<'a> {
    pub message: &'a mut ServerMessage,
    pub tree: &'a mut ComponentTree,
    pub render_state: &'a mut HashMap<ComponentId, Box<dyn Any + Send + Sync>>,
    pub transfers: &'a TransferRegistry,
}

impl RenderContext<'_> {
    pub fn set_render_state(&mut self, id: ComponentId, state: Box<dyn Any + Send + Sync>) {
        self.render_state.insert(id, state);
    }

    pub fn render_state_of<T: 'static>(&self, id: ComponentId) -> Option<&T> {
        self.render_state.get(&id).and_then(|s| s.downcast_ref())
    }
}

/// What a peer may touch while applying client input.
pub struct InputContext<'a> {
    pub tree: &'a mut ComponentTree,
    pub transfers: &'a TransferRegistry,
}

/// Side effects of one render cycle that are not directives: response
/// cookies from `SetCookie` commands and download ids issued by `Download`
/// commands (recorded on the instance for dispose-time cleanup).
#[derive(Default)]
pub struct CycleOutput {
    pub cookies: Vec<Cookie>,
    pub issued_downloads: Vec<String>,
}

/// Renders one component kind to the client and applies its input.
pub trait SyncPeer: Send + Sync {
    /// Renders the component from scratch: a DOM add directive plus whatever
    /// initialization the kind needs.
    fn render_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
        parent_element_id: Option<&str>,
    ) -> Result<(), SyncError>;

    /// Renders client-side disposal for a removed component. The registry
    /// emits the structural DOM removal itself.
    fn render_dispose(&self, ctx: &mut RenderContext<'_>, removed: &RemovedComponent);

    /// The peer's partial-update support, if any.
    fn partial_updates(&self) -> Option<&PartialUpdateManager> {
        None
    }

    fn process_property_update(
        &self,
        ctx: &mut InputContext<'_>,
        element_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), SyncError> {
        update::apply_client_update(ctx.tree, element_id, property, value)
    }

    fn process_action(
        &self,
        ctx: &mut InputContext<'_>,
        action: &ClientAction,
    ) -> Result<(), SyncError> {
        update::apply_client_action(ctx.tree, action)
    }
}

/// Kind-keyed peer table, built once at startup.
#[derive(Default)]
pub struct PeerRegistry {
    peers: HashMap<ComponentKind, Box<dyn SyncPeer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ComponentKind, peer: Box<dyn SyncPeer>) {
        self.peers.insert(kind, peer);
    }

    pub fn peer(&self, kind: ComponentKind) -> Result<&dyn SyncPeer, SyncError> {
        self.peers
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| SyncError::UnsupportedComponent(kind.as_str().to_string()))
    }

    /// Renders a flushed changeset into the server message.
    ///
    /// Disposals render first, and render state for removed components is
    /// discarded before any adds can reuse screen real estate. Live updates
    /// then render in recorded order; a component whose ancestor is itself
    /// being fully re-rendered is skipped, since the ancestor's add subsumes
    /// it.
    pub fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        changeset: &Changeset,
    ) -> Result<(), SyncError> {
        for removed in &changeset.removals {
            if let Some(peer) = self.peers.get(&removed.kind) {
                peer.render_dispose(ctx, removed);
            }
            if let Some(eid) = &removed.element_id {
                ctx.message.add_item(
                    DirectiveGroup::Update,
                    Processors::DOM,
                    "dom-remove",
                    DirectiveItem::for_element(eid.clone()),
                );
            }
            ctx.render_state.remove(&removed.id);
        }

        let mut full = HashSet::new();
        for update in &changeset.updates {
            let peer = self.peer(update.kind)?;
            let partial_ok = !update.is_structural()
                && peer
                    .partial_updates()
                    .map(|pm| pm.can_process(ctx, update))
                    .unwrap_or(false);
            if !partial_ok {
                full.insert(update.id);
            }
        }

        for update in &changeset.updates {
            if !ctx.tree.contains(update.id) {
                continue;
            }
            if self.has_full_ancestor(ctx.tree, update.id, &full)? {
                continue;
            }
            if full.contains(&update.id) {
                if !update.added {
                    let eid = ctx.tree.element_id(update.id)?;
                    ctx.message.add_item(
                        DirectiveGroup::Update,
                        Processors::DOM,
                        "dom-remove",
                        DirectiveItem::for_element(eid),
                    );
                }
                self.render_full_add(ctx, update.id)?;
            } else if let Some(pm) = self.peer(update.kind)?.partial_updates() {
                debug!(kind = update.kind.as_str(), "partial update");
                pm.render(ctx, update)?;
            }
        }
        Ok(())
    }

    /// Renders a component and its entire subtree from scratch.
    pub fn render_full_add(
        &self,
        ctx: &mut RenderContext<'_>,
        id: ComponentId,
    ) -> Result<(), SyncError> {
        let kind = ctx.tree.kind(id)?;
        let peer = self.peer(kind)?;
        let parent_eid = match ctx.tree.parent(id)? {
            Some(parent) => Some(ctx.tree.element_id(parent)?),
            None => None,
        };
        peer.render_add(ctx, id, parent_eid.as_deref())?;
        let children = ctx.tree.children(id)?.to_vec();
        for child in children {
            self.render_full_add(ctx, child)?;
        }
        Ok(())
    }

    /// Applies one client property update through the target component's
    /// peer.
    pub fn process_property_update(
        &self,
        ctx: &mut InputContext<'_>,
        element_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), SyncError> {
        let kind = self.kind_of(ctx.tree, element_id)?;
        self.peer(kind)?
            .process_property_update(ctx, element_id, property, value)
    }

    /// Dispatches a fired client action through the target component's peer.
    pub fn process_action(
        &self,
        ctx: &mut InputContext<'_>,
        action: &ClientAction,
    ) -> Result<(), SyncError> {
        let kind = self.kind_of(ctx.tree, &action.component_id)?;
        self.peer(kind)?.process_action(ctx, action)
    }

    fn kind_of(&self, tree: &ComponentTree, element_id: &str) -> Result<ComponentKind, SyncError> {
        let id = tree.component_by_element_id(element_id).ok_or_else(|| {
            warn!(element_id, "client referenced a component no longer in the tree");
            SyncError::StaleComponent(element_id.to_string())
        })?;
        tree.kind(id)
    }

    fn has_full_ancestor(
        &self,
        tree: &ComponentTree,
        id: ComponentId,
        full: &HashSet<ComponentId>,
    ) -> Result<bool, SyncError> {
        let mut current = tree.parent(id)?;
        while let Some(ancestor) = current {
            if full.contains(&ancestor) {
                return Ok(true);
            }
            current = tree.parent(ancestor)?;
        }
        Ok(false)
    }
}
