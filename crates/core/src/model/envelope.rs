use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of a Pub/Sub push delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PushEnvelope {
    #[serde(default)]
    pub message: PushMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    /// Base64 payload. Absent means an empty payload.
    #[serde(default)]
    pub data: String,
    #[serde(
        default,
        rename = "messageId",
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,
    #[serde(
        default,
        rename = "publishTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}
