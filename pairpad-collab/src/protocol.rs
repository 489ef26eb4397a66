//! JSON wire protocol between clients and the session coordinator.
//!
//! Every frame is one `Message` with all fields present and unused fields
//! zero-valued:
//!
//! ```json
//! { "username": "", "text": "", "type": "operation", "ID": "…",
//!   "operation": { "type": "insert", "position": 1, "value": "x" },
//!   "document": { "characters": [] } }
//! ```
//!
//! `position` is a 1-based visible position. `ID` is the addressee on
//! `docSync`/`docReq`/`SiteID` and the sender stamp on `operation`/`join`.

use pairpad_crdt::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Discriminator for the six message kinds.
///
/// Unrecognized strings deserialize to [`MessageType::Unknown`] instead of
/// failing the whole frame; the routing layers log and tolerate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    /// Full-document snapshot, addressed to one client.
    DocSync,
    /// Ask an existing peer to snapshot its document for a newcomer.
    DocReq,
    /// Site id assignment, addressed to one client.
    SiteId,
    /// A participant announcing its username.
    Join,
    /// Comma-separated list of all current usernames.
    Users,
    /// An insert or delete relayed between replicas.
    Operation,
    #[default]
    Unknown,
}

impl MessageType {
    /// The exact tag on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::DocSync => "docSync",
            MessageType::DocReq => "docReq",
            MessageType::SiteId => "SiteID",
            MessageType::Join => "join",
            MessageType::Users => "users",
            MessageType::Operation => "operation",
            MessageType::Unknown => "unknown",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "docSync" => MessageType::DocSync,
            "docReq" => MessageType::DocReq,
            "SiteID" => MessageType::SiteId,
            "join" => MessageType::Join,
            "users" => MessageType::Users,
            "operation" => MessageType::Operation,
            _ => MessageType::Unknown,
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag: std::borrow::Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        Ok(MessageType::from_tag(&tag))
    }
}

/// Kind of an edit operation. The zero value is the empty tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationKind {
    Insert,
    Delete,
    #[default]
    None,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
            OperationKind::None => "",
        }
    }
}

impl Serialize for OperationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag: std::borrow::Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        Ok(match tag.as_ref() {
            "insert" => OperationKind::Insert,
            "delete" => OperationKind::Delete,
            _ => OperationKind::None,
        })
    }
}

/// An edit at a 1-based visible position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EditOperation {
    #[serde(rename = "type", default)]
    pub kind: OperationKind,
    #[serde(default)]
    pub position: usize,
    #[serde(default)]
    pub value: String,
}

impl EditOperation {
    pub fn insert(position: usize, value: impl Into<String>) -> Self {
        EditOperation {
            kind: OperationKind::Insert,
            position,
            value: value.into(),
        }
    }

    pub fn delete(position: usize) -> Self {
        EditOperation {
            kind: OperationKind::Delete,
            position,
            value: String::new(),
        }
    }
}

/// One wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(rename = "ID", default)]
    pub id: Uuid,
    #[serde(default)]
    pub operation: EditOperation,
    #[serde(default = "empty_document")]
    pub document: Document,
}

/// The zero value on the wire is an empty character list, not a fresh
/// sentinel-only document.
fn empty_document() -> Document {
    Document {
        characters: Vec::new(),
    }
}

impl Default for Message {
    fn default() -> Self {
        Message {
            username: String::new(),
            text: String::new(),
            kind: MessageType::Unknown,
            id: Uuid::nil(),
            operation: EditOperation::default(),
            document: empty_document(),
        }
    }
}

impl Message {
    /// A participant announcing itself after connecting.
    pub fn join(username: impl Into<String>) -> Self {
        Message {
            username: username.into(),
            text: "has joined the session.".to_string(),
            kind: MessageType::Join,
            ..Message::default()
        }
    }

    /// Site id assignment, addressed to `to`.
    pub fn site_id(site_id: impl Into<String>, to: Uuid) -> Self {
        Message {
            text: site_id.into(),
            kind: MessageType::SiteId,
            id: to,
            ..Message::default()
        }
    }

    /// Snapshot request on behalf of the newcomer `requester`.
    pub fn doc_req(requester: Uuid) -> Self {
        Message {
            kind: MessageType::DocReq,
            id: requester,
            ..Message::default()
        }
    }

    /// Full-document snapshot addressed to `to`.
    pub fn doc_sync(document: Document, to: Uuid) -> Self {
        Message {
            kind: MessageType::DocSync,
            id: to,
            document,
            ..Message::default()
        }
    }

    /// The current user list, comma-separated.
    pub fn users(list: impl Into<String>) -> Self {
        Message {
            text: list.into(),
            kind: MessageType::Users,
            ..Message::default()
        }
    }

    /// An edit emitted by `username`.
    pub fn operation(username: impl Into<String>, operation: EditOperation) -> Self {
        Message {
            username: username.into(),
            kind: MessageType::Operation,
            operation,
            ..Message::default()
        }
    }

    /// Serialize to the JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}

/// Transport and codec errors.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("malformed message: {0}")]
    Deserialization(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_round_trip() {
        let msg = Message::operation("alice", EditOperation::insert(3, "x"));
        let encoded = msg.encode().unwrap();
        let decoded = Message::decode(&encoded).unwrap();

        assert_eq!(decoded.kind, MessageType::Operation);
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.operation.kind, OperationKind::Insert);
        assert_eq!(decoded.operation.position, 3);
        assert_eq!(decoded.operation.value, "x");
    }

    #[test]
    fn wire_field_names() {
        let msg = Message::site_id("2", Uuid::nil());
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

        // Every field present, schema names exact.
        assert_eq!(value["type"], "SiteID");
        assert_eq!(value["text"], "2");
        assert!(value.get("username").is_some());
        assert!(value.get("ID").is_some());
        assert!(value.get("operation").is_some());
        assert_eq!(value["operation"]["type"], "");
        assert_eq!(value["operation"]["position"], 0);
        assert_eq!(value["document"]["characters"], serde_json::json!([]));
    }

    #[test]
    fn type_strings_match_schema() {
        for (kind, name) in [
            (MessageType::DocSync, "docSync"),
            (MessageType::DocReq, "docReq"),
            (MessageType::SiteId, "SiteID"),
            (MessageType::Join, "join"),
            (MessageType::Users, "users"),
            (MessageType::Operation, "operation"),
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{name}\""));
        }
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let decoded = Message::decode(
            r#"{"username":"","text":"","type":"frobnicate","ID":"00000000-0000-0000-0000-000000000000"}"#,
        )
        .unwrap();
        assert_eq!(decoded.kind, MessageType::Unknown);
    }

    #[test]
    fn missing_fields_are_zero_valued() {
        let decoded = Message::decode(r#"{"type":"docReq"}"#).unwrap();
        assert_eq!(decoded.kind, MessageType::DocReq);
        assert_eq!(decoded.id, Uuid::nil());
        assert_eq!(decoded.username, "");
        assert_eq!(decoded.operation.kind, OperationKind::None);
        assert!(decoded.document.characters.is_empty());
    }

    #[test]
    fn doc_sync_carries_the_document() {
        let mut replica = pairpad_crdt::Replica::new();
        replica.set_site_id(1);
        replica.insert(1, "H").unwrap();
        replica.insert(2, "I").unwrap();

        let to = Uuid::new_v4();
        let msg = Message::doc_sync(replica.document.clone(), to);
        let decoded = Message::decode(&msg.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, MessageType::DocSync);
        assert_eq!(decoded.id, to);
        assert_eq!(decoded.document.content(), "HI");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Message::decode("not json").is_err());
        assert!(Message::decode(r#"{"type": 7}"#).is_err());
    }
}
