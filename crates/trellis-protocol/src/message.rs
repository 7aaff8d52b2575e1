//! Outgoing server message: an ordered collection of directive groups.
//!
//! A `ServerMessage` is built up over one synchronization cycle and rendered
//! once into the JSON wire structure. Directives accumulate into batches
//! keyed by `(processor, operation)` within one of three fixed groups, which
//! the client applies strictly in order: pre-remove, update, post-update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::names::Processors;

/// The three fixed directive groups, in client application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveGroup {
    /// Applied first: disposal of client-side state about to be removed.
    PreRemove,
    /// Applied second: structural DOM changes and style patches.
    Update,
    /// Applied last: property initialization against the updated DOM.
    PostUpdate,
}

impl DirectiveGroup {
    /// All groups, in wire order.
    pub const ALL: [DirectiveGroup; 3] = [Self::PreRemove, Self::Update, Self::PostUpdate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreRemove => "pre-remove",
            Self::Update => "update",
            Self::PostUpdate => "post-update",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::PreRemove => 0,
            Self::Update => 1,
            Self::PostUpdate => 2,
        }
    }
}

/// One item within a directive batch: an element id plus operation-specific
/// attributes (e.g. `text`, `horizontal-scroll`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DirectiveItem {
    #[serde(flatten)]
    attributes: BTreeMap<String, String>,
}

impl DirectiveItem {
    /// Creates an item targeting the given element id.
    pub fn for_element(element_id: impl Into<String>) -> Self {
        let mut item = Self::default();
        item.attributes.insert("eid".into(), element_id.into());
        item
    }

    /// Sets an operation-specific attribute, builder style.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn element_id(&self) -> Option<&str> {
        self.get("eid")
    }
}

#[derive(Debug, Clone)]
struct Batch {
    processor: String,
    operation: String,
    items: Vec<DirectiveItem>,
}

/// Accumulates directives for one HTTP response cycle.
///
/// Building never fails; malformed directive content (e.g. an invalid element
/// id) is a programming error at the call site, not a builder-level error.
#[derive(Debug, Default)]
pub struct ServerMessage {
    groups: [Vec<Batch>; 3],
    libraries: Vec<String>,
    async_interval: Option<u64>,
}

impl ServerMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item to the `(processor, operation)` batch of the given
    /// group, creating the batch on first use. Batches keep the order in
    /// which they were first addressed.
    pub fn add_item(
        &mut self,
        group: DirectiveGroup,
        processor: &str,
        operation: &str,
        item: DirectiveItem,
    ) {
        let batches = &mut self.groups[group.index()];
        if let Some(batch) = batches
            .iter_mut()
            .find(|b| b.processor == processor && b.operation == operation)
        {
            batch.items.push(item);
            return;
        }
        batches.push(Batch {
            processor: processor.into(),
            operation: operation.into(),
            items: vec![item],
        });
    }

    /// Records a client-side script dependency. De-duplicated: a library is
    /// emitted once per response no matter how many peers request it.
    pub fn add_library(&mut self, service_id: &str) {
        if !self.libraries.iter().any(|l| l == service_id) {
            self.libraries.push(service_id.to_string());
        }
    }

    /// Sets the background-task polling interval advertised to the client.
    pub fn set_async_interval(&mut self, millis: u64) {
        self.async_interval = Some(millis);
    }

    /// True if no directives or libraries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.groups.iter().all(|g| g.is_empty())
    }

    /// Renders the final wire structure.
    ///
    /// Groups always appear in the fixed order pre-remove, update,
    /// post-update. Within the update group, DOM-structural batches precede
    /// all other batches so that a property directive never targets an
    /// element the client has not yet created.
    pub fn render(self) -> WireMessage {
        let mut groups = Vec::with_capacity(3);
        for (index, group) in DirectiveGroup::ALL.iter().enumerate() {
            let mut batches = self.groups[index].clone();
            if *group == DirectiveGroup::Update {
                // Stable partition: DOM batches first, relative order kept.
                batches.sort_by_key(|b| b.processor != Processors::DOM);
            }
            groups.push(WireGroup {
                id: group.as_str().to_string(),
                directives: batches
                    .into_iter()
                    .map(|b| WireDirective {
                        processor: b.processor,
                        operation: b.operation,
                        items: b.items,
                    })
                    .collect(),
            });
        }
        WireMessage {
            libraries: self.libraries,
            groups,
            async_interval: self.async_interval,
        }
    }
}

/// One rendered directive batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDirective {
    pub processor: String,
    pub operation: String,
    pub items: Vec<DirectiveItem>,
}

/// One rendered directive group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireGroup {
    pub id: String,
    pub directives: Vec<WireDirective>,
}

/// The complete rendered synchronization response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub libraries: Vec<String>,
    pub groups: Vec<WireGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_interval: Option<u64>,
}

impl WireMessage {
    /// Convenience lookup used by tests and the client simulator: all items
    /// of a `(group, processor, operation)` batch.
    pub fn items(&self, group: &str, processor: &str, operation: &str) -> Vec<&DirectiveItem> {
        self.groups
            .iter()
            .filter(|g| g.id == group)
            .flat_map(|g| &g.directives)
            .filter(|d| d.processor == processor && d.operation == operation)
            .flat_map(|d| &d.items)
            .collect()
    }
}
