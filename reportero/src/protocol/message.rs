// Message Envelope: the unit exchanged between agents

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ProtocolError;

pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Notification,
    Error,
}

impl MessageKind {
    /// Responses and errors answer a request and must carry `in_reply_to`.
    pub fn is_reply(self) -> bool {
        matches!(self, MessageKind::Response | MessageKind::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Notification => "notification",
            MessageKind::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable message. Every constructed or decoded envelope has passed
/// [`Envelope::validate`], so the kind/`in_reply_to` pairing always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    message_id: String,
    #[serde(rename = "message_type")]
    kind: MessageKind,
    sender_id: String,
    receiver_id: Option<String>,
    timestamp: DateTime<Utc>,
    payload: Payload,
    in_reply_to: Option<String>,
}

impl Envelope {
    pub fn build(
        kind: MessageKind,
        sender_id: impl Into<String>,
        receiver_id: Option<String>,
        payload: Payload,
        in_reply_to: Option<String>,
    ) -> Result<Self, ProtocolError> {
        let envelope = Envelope {
            message_id: Uuid::new_v4().to_string(),
            kind,
            sender_id: sender_id.into(),
            receiver_id,
            timestamp: Utc::now(),
            payload,
            in_reply_to,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Decode a wire envelope. Unknown fields are ignored; anything missing
    /// or inconsistent is reported as `MalformedMessage`.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.message_id.trim().is_empty() {
            return Err(malformed("message_id must not be empty"));
        }
        if self.sender_id.trim().is_empty() {
            return Err(malformed("sender_id must not be empty"));
        }

        match (self.kind.is_reply(), self.in_reply_to.as_deref()) {
            (true, None) | (true, Some("")) => {
                return Err(malformed(format!("{} message requires in_reply_to", self.kind)));
            }
            (false, Some(_)) => {
                return Err(malformed(format!("{} message must not set in_reply_to", self.kind)));
            }
            _ => {}
        }

        match self.kind {
            MessageKind::Request => {
                if !matches!(self.payload.get("action"), Some(Value::String(_))) {
                    return Err(malformed("request payload requires an 'action' string"));
                }
                if !matches!(self.payload.get("params"), Some(Value::Object(_))) {
                    return Err(malformed("request payload requires a 'params' mapping"));
                }
            }
            MessageKind::Response => {
                require_key(&self.payload, "result", self.kind)?;
                require_success(&self.payload, self.kind)?;
            }
            MessageKind::Error => {
                require_key(&self.payload, "error", self.kind)?;
                require_success(&self.payload, self.kind)?;
            }
            MessageKind::Notification => {}
        }

        Ok(())
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> Option<&str> {
        self.receiver_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.in_reply_to.as_deref()
    }

    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(Value::as_str)
    }

    pub fn params(&self) -> Value {
        self.payload.get("params").cloned().unwrap_or_else(|| Value::Object(Map::new()))
    }
}

pub fn request_payload(action: &str, params: Payload) -> Payload {
    let mut payload = Payload::new();
    payload.insert("action".to_string(), Value::String(action.to_string()));
    payload.insert("params".to_string(), Value::Object(params));
    payload
}

pub fn response_payload(result: Value) -> Payload {
    let mut payload = Payload::new();
    payload.insert("result".to_string(), result);
    payload.insert("success".to_string(), Value::Bool(true));
    payload
}

pub fn error_payload(message: impl Into<String>) -> Payload {
    let mut payload = Payload::new();
    payload.insert("error".to_string(), Value::String(message.into()));
    payload.insert("success".to_string(), Value::Bool(false));
    payload
}

fn malformed(detail: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedMessage(detail.into())
}

fn require_key(payload: &Payload, key: &str, kind: MessageKind) -> Result<(), ProtocolError> {
    if payload.contains_key(key) {
        Ok(())
    } else {
        Err(malformed(format!("{} payload requires '{}'", kind, key)))
    }
}

fn require_success(payload: &Payload, kind: MessageKind) -> Result<(), ProtocolError> {
    match payload.get("success") {
        Some(Value::Bool(_)) => Ok(()),
        _ => Err(malformed(format!("{} payload requires a 'success' boolean", kind))),
    }
}

#[derive(Deserialize)]
struct WireEnvelope {
    message_id: String,
    message_type: MessageKind,
    sender_id: String,
    #[serde(default)]
    receiver_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    payload: Payload,
    #[serde(default)]
    in_reply_to: Option<String>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let envelope = Envelope {
            message_id: wire.message_id,
            kind: wire.message_type,
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            payload: wire.payload,
            in_reply_to: wire.in_reply_to,
        };
        envelope.validate()?;
        Ok(envelope)
    }
}

// Peers may send RFC 3339 timestamps or naive ones without an offset; naive
// values are taken as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn reply_kinds_require_in_reply_to() {
        for kind in [MessageKind::Request, MessageKind::Response, MessageKind::Notification, MessageKind::Error] {
            let payload = match kind {
                MessageKind::Request => request_payload("echo", Payload::new()),
                MessageKind::Response => response_payload(json!(1)),
                MessageKind::Error => error_payload("boom"),
                MessageKind::Notification => Payload::new(),
            };

            let with = Envelope::build(kind, "a", None, payload.clone(), Some("req-1".into()));
            let without = Envelope::build(kind, "a", None, payload, None);

            if kind.is_reply() {
                assert_eq!(with.unwrap().in_reply_to(), Some("req-1"));
                assert!(matches!(without, Err(ProtocolError::MalformedMessage(_))));
            } else {
                assert!(matches!(with, Err(ProtocolError::MalformedMessage(_))));
                assert!(without.unwrap().in_reply_to().is_none());
            }
        }
    }

    #[test]
    fn build_assigns_fresh_ids() {
        let a = Envelope::build(MessageKind::Notification, "a", None, Payload::new(), None).unwrap();
        let b = Envelope::build(MessageKind::Notification, "a", None, Payload::new(), None).unwrap();
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn request_payload_must_name_action_and_params() {
        let missing_params = params(json!({"action": "echo"}));
        let err = Envelope::build(MessageKind::Request, "a", Some("b".into()), missing_params, None)
            .unwrap_err();
        assert!(err.to_string().contains("params"));

        let missing_action = params(json!({"params": {}}));
        assert!(Envelope::build(MessageKind::Request, "a", None, missing_action, None).is_err());
    }

    #[test]
    fn reply_payload_requires_success_flag() {
        let payload = params(json!({"result": 1}));
        let err = Envelope::build(MessageKind::Response, "a", None, payload, Some("r".into()))
            .unwrap_err();
        assert!(err.to_string().contains("success"));
    }

    #[test]
    fn decodes_wire_shape_and_ignores_extra_fields() {
        let text = json!({
            "message_id": "m-1",
            "message_type": "response",
            "sender_id": "peer",
            "receiver_id": null,
            "timestamp": "2025-03-01T10:15:30.123456",
            "payload": {"result": {"x": 1}, "success": true},
            "in_reply_to": "req-9",
            "priority": "high"
        })
        .to_string();

        let envelope = Envelope::from_json(&text).unwrap();
        assert_eq!(envelope.kind(), MessageKind::Response);
        assert_eq!(envelope.in_reply_to(), Some("req-9"));
        assert_eq!(envelope.timestamp().to_rfc3339(), "2025-03-01T10:15:30.123456+00:00");
    }

    #[test]
    fn missing_fields_are_malformed() {
        let text = json!({"message_type": "notification", "payload": {}}).to_string();
        assert!(matches!(
            Envelope::from_json(&text),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn decoding_rejects_invariant_violations() {
        let text = json!({
            "message_id": "m-2",
            "message_type": "error",
            "sender_id": "peer",
            "timestamp": "2025-03-01T10:15:30Z",
            "payload": {"error": "x", "success": false}
        })
        .to_string();
        let err = Envelope::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("in_reply_to"));
    }

    #[test]
    fn serializes_wire_field_names() {
        let envelope = Envelope::build(
            MessageKind::Request,
            "me",
            Some("peer".into()),
            request_payload("echo", params(json!({"x": 1}))),
            None,
        )
        .unwrap();

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["message_type"], "request");
        assert_eq!(value["receiver_id"], "peer");
        assert_eq!(value["payload"]["params"]["x"], 1);
        assert!(value["in_reply_to"].is_null());

        let decoded = Envelope::from_value(value).unwrap();
        assert_eq!(decoded, envelope);
    }
}
