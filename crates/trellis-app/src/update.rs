//! Changeset accumulation and client input application.
//!
//! The update manager accumulates everything that changed on the server since
//! the last exchange with the client. Accumulation is coalescing: one entry
//! per mutated component in first-recorded order, and for a property changed
//! twice the entry keeps the original old value and the most recent new
//! value. `flush` hands the ordered changeset to the renderer exactly once
//! per cycle.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use trellis_protocol::{ClientAction, SyncError};

use crate::tree::{ComponentId, ComponentKind, ComponentTree, RemovedComponent};

/// One coalesced property change.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// Everything that changed about one component during the current cycle.
#[derive(Debug, Clone)]
pub struct ServerComponentUpdate {
    pub id: ComponentId,
    pub kind: ComponentKind,
    /// The component was added to the tree this cycle.
    pub added: bool,
    /// Children were added or removed this cycle.
    pub children_changed: bool,
    pub properties: Vec<PropertyChange>,
}

impl ServerComponentUpdate {
    fn new(id: ComponentId, kind: ComponentKind) -> Self {
        Self {
            id,
            kind,
            added: false,
            children_changed: false,
            properties: Vec::new(),
        }
    }

    /// A structural change always forces a full component replace on the
    /// client; only pure property updates are candidates for partial
    /// rendering.
    pub fn is_structural(&self) -> bool {
        self.added || self.children_changed
    }

    pub fn changed_properties(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}

/// The flushed per-cycle changeset.
#[derive(Debug, Default)]
pub struct Changeset {
    /// Mutated live components, in first-recorded order.
    pub updates: Vec<ServerComponentUpdate>,
    /// Components discarded this cycle, children before parents.
    pub removals: Vec<RemovedComponent>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Accumulates the server-side changeset for the current cycle.
#[derive(Default)]
pub struct UpdateManager {
    order: Vec<ComponentId>,
    entries: HashMap<ComponentId, ServerComponentUpdate>,
    removals: Vec<RemovedComponent>,
}

impl UpdateManager {
    pub fn record_add(&mut self, id: ComponentId, kind: ComponentKind) {
        self.entry(id, kind).added = true;
    }

    pub fn record_children_changed(&mut self, id: ComponentId, kind: ComponentKind) {
        self.entry(id, kind).children_changed = true;
    }

    pub fn record_property_change(
        &mut self,
        id: ComponentId,
        kind: ComponentKind,
        name: &str,
        old: Value,
        new: Value,
    ) {
        let entry = self.entry(id, kind);
        match entry.properties.iter_mut().find(|p| p.name == name) {
            // First old value and latest new value survive coalescing.
            Some(change) => change.new = new,
            None => entry.properties.push(PropertyChange {
                name: name.to_string(),
                old,
                new,
            }),
        }
    }

    pub fn record_remove(&mut self, removed: RemovedComponent) {
        self.removals.push(removed);
    }

    /// Drops any pending entry for a component that left the tree; a removed
    /// component must never also appear as an update.
    pub fn cancel(&mut self, id: ComponentId) {
        if self.entries.remove(&id).is_some() {
            self.order.retain(|o| *o != id);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.order.is_empty() || !self.removals.is_empty()
    }

    /// Returns the accumulated changeset and resets accumulation. Called once
    /// per cycle, after application callbacks and before rendering.
    pub fn flush(&mut self) -> Changeset {
        let updates = self
            .order
            .drain(..)
            .filter_map(|id| self.entries.remove(&id))
            .collect::<Vec<_>>();
        let removals = std::mem::take(&mut self.removals);
        debug!(
            updates = updates.len(),
            removals = removals.len(),
            "changeset flushed"
        );
        Changeset { updates, removals }
    }

    fn entry(&mut self, id: ComponentId, kind: ComponentKind) -> &mut ServerComponentUpdate {
        match self.entries.entry(id) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                self.order.push(id);
                e.insert(ServerComponentUpdate::new(id, kind))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Client input application
// ─────────────────────────────────────────────────────────────────────────

/// Applies one client property update. The component must still be part of
/// the tree; the raw wire value is coerced to the property's semantic type.
/// The resulting `set_property` records a server-side change so application
/// listeners observe client edits.
pub fn apply_client_update(
    tree: &mut ComponentTree,
    element_id: &str,
    property: &str,
    raw: Value,
) -> Result<(), SyncError> {
    let id = tree
        .component_by_element_id(element_id)
        .ok_or_else(|| SyncError::StaleComponent(element_id.to_string()))?;
    let value = coerce_property(property, raw)?;
    tree.set_property(id, property, value)
}

/// Dispatches a fired client action to the component's action listener, if
/// any. Stale references fail the same way property updates do.
pub fn apply_client_action(
    tree: &mut ComponentTree,
    action: &ClientAction,
) -> Result<(), SyncError> {
    let id = tree
        .component_by_element_id(&action.component_id)
        .ok_or_else(|| SyncError::StaleComponent(action.component_id.clone()))?;
    if let Some(listener) = tree.action_listener(id) {
        listener.action_performed(tree, id, action);
    }
    Ok(())
}

fn coerce_property(property: &str, raw: Value) -> Result<Value, SyncError> {
    match property {
        "horizontal-scroll" | "vertical-scroll" => {
            Ok(Value::from(coerce_scroll_offset(property, &raw)?))
        }
        "text" => match raw {
            Value::String(_) => Ok(raw),
            other => Err(SyncError::InvalidPropertyValue {
                property: property.to_string(),
                value: other.to_string(),
            }),
        },
        _ => Ok(raw),
    }
}

/// Coerces a scroll offset sent by the client to an integer pixel value.
///
/// Some client engines report fractional scroll positions (e.g. `"4.444"`);
/// these are rounded half-away-from-zero rather than rejected (`4.5` → 5,
/// `-4.5` → -5). This is intentional compatibility behavior for a known
/// client quirk, not a general numeric policy.
pub fn coerce_scroll_offset(property: &str, raw: &Value) -> Result<i64, SyncError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(x) if x.is_finite() => Ok((x.abs() + 0.5).floor().copysign(x) as i64),
        _ => Err(SyncError::InvalidPropertyValue {
            property: property.to_string(),
            value: raw.to_string(),
        }),
    }
}
