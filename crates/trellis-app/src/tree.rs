//! The server-side component tree.
//!
//! Components live in an arena indexed by `ComponentId`. Slots are recycled
//! through a freelist when components are removed, but render identities (the
//! strings the client addresses components by) are allocated from a counter
//! and never reused within a session, so a late client reference to a removed
//! component can never alias a new one.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use trellis_protocol::{ClientAction, SyncError};

use crate::transfer::{DownloadProvider, UploadListener};
use crate::update::UpdateManager;

/// Component type tag. Peer dispatch keys on this at startup; there is no
/// runtime type discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    ContentPane,
    Label,
    TextField,
    TextArea,
    UploadSelect,
    FilePane,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentPane => "ContentPane",
            Self::Label => "Label",
            Self::TextField => "TextField",
            Self::TextArea => "TextArea",
            Self::UploadSelect => "UploadSelect",
            Self::FilePane => "FilePane",
        }
    }
}

/// Arena handle for a live component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Reacts to a client action fired on a component. Listeners are unicast and
/// excluded from snapshots; applications reattach them on reactivation.
pub trait ActionListener: Send + Sync {
    fn action_performed(&self, tree: &mut ComponentTree, component: ComponentId, action: &ClientAction);
}

struct Node {
    kind: ComponentKind,
    render_id: Option<u64>,
    properties: HashMap<String, Value>,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    upload_listener: Option<Arc<dyn UploadListener>>,
    action_listener: Option<Arc<dyn ActionListener>>,
    download_provider: Option<Arc<dyn DownloadProvider>>,
}

/// A component discarded from the tree, reported so peers can render its
/// disposal and the container can drop its render state.
#[derive(Debug, Clone)]
pub struct RemovedComponent {
    pub id: ComponentId,
    pub kind: ComponentKind,
    /// Present only if the component was ever rendered.
    pub element_id: Option<String>,
}

/// Serializable form of the tree, produced on passivation. Listeners are not
/// captured; the application reattaches them after `restore`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TreeSnapshot {
    nodes: Vec<Option<SnapshotNode>>,
    free: Vec<u32>,
    root: Option<ComponentId>,
    next_render_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotNode {
    kind: ComponentKind,
    render_id: Option<u64>,
    properties: HashMap<String, Value>,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
}

/// The component arena plus its update manager.
#[derive(Default)]
pub struct ComponentTree {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    root: Option<ComponentId>,
    next_render_id: u64,
    by_render_id: HashMap<u64, ComponentId>,
    updates: UpdateManager,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the root component. May be called once per tree.
    pub fn init_root(&mut self, kind: ComponentKind) -> Result<ComponentId, SyncError> {
        if self.root.is_some() {
            return Err(SyncError::IllegalState(
                "component tree already has a root".into(),
            ));
        }
        let id = self.insert(kind, None);
        self.root = Some(id);
        self.updates.record_add(id, kind);
        Ok(id)
    }

    pub fn root(&self) -> Option<ComponentId> {
        self.root
    }

    /// Adds a child component under `parent`.
    pub fn add_child(
        &mut self,
        parent: ComponentId,
        kind: ComponentKind,
    ) -> Result<ComponentId, SyncError> {
        self.node(parent)?;
        let id = self.insert(kind, Some(parent));
        if let Ok(node) = self.node_mut(parent) {
            node.children.push(id);
        }
        let parent_kind = self.node(parent)?.kind;
        self.updates.record_add(id, kind);
        self.updates.record_children_changed(parent, parent_kind);
        debug!(child = kind.as_str(), parent = parent_kind.as_str(), "component added");
        Ok(id)
    }

    /// Removes a component and its entire subtree. Pending changeset entries
    /// for every discarded component are cancelled, and each is reported
    /// (children before parents) for peer disposal.
    pub fn remove(&mut self, id: ComponentId) -> Result<Vec<RemovedComponent>, SyncError> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            if let Ok(node) = self.node_mut(parent) {
                node.children.retain(|c| *c != id);
            }
            let parent_kind = self.node(parent)?.kind;
            self.updates.record_children_changed(parent, parent_kind);
        } else if self.root == Some(id) {
            self.root = None;
        }

        let mut removed = Vec::new();
        self.discard_subtree(id, &mut removed);
        for r in &removed {
            self.updates.cancel(r.id);
            self.updates.record_remove(r.clone());
        }
        debug!(count = removed.len(), "component subtree removed");
        Ok(removed)
    }

    fn discard_subtree(&mut self, id: ComponentId, removed: &mut Vec<RemovedComponent>) {
        let children = match &self.nodes[id.index()] {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.discard_subtree(child, removed);
        }
        if let Some(node) = self.nodes[id.index()].take() {
            if let Some(rid) = node.render_id {
                self.by_render_id.remove(&rid);
            }
            removed.push(RemovedComponent {
                id,
                kind: node.kind,
                element_id: node.render_id.map(element_id_for),
            });
            self.free.push(id.0);
        }
    }

    /// Sets a property, recording the change so both the renderer and any
    /// application listeners observe it.
    pub fn set_property(
        &mut self,
        id: ComponentId,
        name: &str,
        value: Value,
    ) -> Result<(), SyncError> {
        let kind = self.node(id)?.kind;
        let old = self
            .node_mut(id)?
            .properties
            .insert(name.to_string(), value.clone());
        self.updates
            .record_property_change(id, kind, name, old.unwrap_or(Value::Null), value);
        Ok(())
    }

    pub fn property(&self, id: ComponentId, name: &str) -> Option<&Value> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .and_then(|n| n.properties.get(name))
    }

    pub fn kind(&self, id: ComponentId) -> Result<ComponentKind, SyncError> {
        Ok(self.node(id)?.kind)
    }

    pub fn children(&self, id: ComponentId) -> Result<&[ComponentId], SyncError> {
        Ok(&self.node(id)?.children)
    }

    pub fn parent(&self, id: ComponentId) -> Result<Option<ComponentId>, SyncError> {
        Ok(self.node(id)?.parent)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes
            .get(id.index())
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn set_upload_listener(
        &mut self,
        id: ComponentId,
        listener: Arc<dyn UploadListener>,
    ) -> Result<(), SyncError> {
        self.node_mut(id)?.upload_listener = Some(listener);
        Ok(())
    }

    pub fn upload_listener(&self, id: ComponentId) -> Option<Arc<dyn UploadListener>> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .and_then(|n| n.upload_listener.clone())
    }

    pub fn set_action_listener(
        &mut self,
        id: ComponentId,
        listener: Arc<dyn ActionListener>,
    ) -> Result<(), SyncError> {
        self.node_mut(id)?.action_listener = Some(listener);
        Ok(())
    }

    pub fn action_listener(&self, id: ComponentId) -> Option<Arc<dyn ActionListener>> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .and_then(|n| n.action_listener.clone())
    }

    /// Attaches the content provider a file-pane component's frame serves.
    pub fn set_download_provider(
        &mut self,
        id: ComponentId,
        provider: Arc<dyn DownloadProvider>,
    ) -> Result<(), SyncError> {
        self.node_mut(id)?.download_provider = Some(provider);
        Ok(())
    }

    pub fn download_provider(&self, id: ComponentId) -> Option<Arc<dyn DownloadProvider>> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .and_then(|n| n.download_provider.clone())
    }

    /// The component's client-side element id, assigning a render identity on
    /// first use.
    pub fn element_id(&mut self, id: ComponentId) -> Result<String, SyncError> {
        if let Some(rid) = self.node(id)?.render_id {
            return Ok(element_id_for(rid));
        }
        let rid = self.next_render_id;
        self.next_render_id += 1;
        self.node_mut(id)?.render_id = Some(rid);
        self.by_render_id.insert(rid, id);
        Ok(element_id_for(rid))
    }

    /// Resolves a client-supplied element id (`c_<n>`) to a live component.
    pub fn component_by_element_id(&self, element_id: &str) -> Option<ComponentId> {
        let rid: u64 = element_id.strip_prefix("c_")?.parse().ok()?;
        self.by_render_id.get(&rid).copied()
    }

    pub fn updates(&mut self) -> &mut UpdateManager {
        &mut self.updates
    }

    /// Captures the serializable state of the tree for passivation.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|slot| {
                    slot.as_ref().map(|n| SnapshotNode {
                        kind: n.kind,
                        render_id: n.render_id,
                        properties: n.properties.clone(),
                        parent: n.parent,
                        children: n.children.clone(),
                    })
                })
                .collect(),
            free: self.free.clone(),
            root: self.root,
            next_render_id: self.next_render_id,
        }
    }

    /// Rebuilds a tree from a snapshot. The pending changeset starts empty;
    /// listeners must be reattached by the application.
    pub fn restore(snapshot: TreeSnapshot) -> Self {
        let mut by_render_id = HashMap::new();
        let nodes: Vec<Option<Node>> = snapshot
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.map(|n| {
                    if let Some(rid) = n.render_id {
                        by_render_id.insert(rid, ComponentId(index as u32));
                    }
                    Node {
                        kind: n.kind,
                        render_id: n.render_id,
                        properties: n.properties,
                        parent: n.parent,
                        children: n.children,
                        upload_listener: None,
                        action_listener: None,
                        download_provider: None,
                    }
                })
            })
            .collect();
        Self {
            nodes,
            free: snapshot.free,
            root: snapshot.root,
            next_render_id: snapshot.next_render_id,
            by_render_id,
            updates: UpdateManager::default(),
        }
    }

    fn insert(&mut self, kind: ComponentKind, parent: Option<ComponentId>) -> ComponentId {
        let node = Node {
            kind,
            render_id: None,
            properties: HashMap::new(),
            parent,
            children: Vec::new(),
            upload_listener: None,
            action_listener: None,
            download_provider: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                ComponentId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                ComponentId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn node(&self, id: ComponentId) -> Result<&Node, SyncError> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| SyncError::StaleComponent(format!("#{}", id.0)))
    }

    fn node_mut(&mut self, id: ComponentId) -> Result<&mut Node, SyncError> {
        self.nodes
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| SyncError::StaleComponent(format!("#{}", id.0)))
    }
}

fn element_id_for(render_id: u64) -> String {
    format!("c_{render_id}")
}
