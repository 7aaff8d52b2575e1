//! Incoming client changeset.
//!
//! Once per user interaction the client posts a JSON document describing
//! everything that changed on its side since the last exchange: a list of
//! property updates plus at most one fired action (the input that actually
//! triggered the round-trip).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One client-side property change, addressed by render id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPropertyUpdate {
    pub component_id: String,
    pub property: String,
    pub value: Value,
}

/// The action that triggered this synchronization, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAction {
    pub component_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// The complete changeset posted to the synchronize service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(default)]
    pub property_updates: Vec<ClientPropertyUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ClientAction>,
}
