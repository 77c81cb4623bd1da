use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of source-configuration change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "SOURCE_CREATED")]
    SourceCreated,
    #[serde(rename = "SOURCE_UPDATED")]
    SourceUpdated,
    #[serde(rename = "SOURCE_DELETED")]
    SourceDeleted,
    #[serde(rename = "SOURCE_ENABLED")]
    SourceEnabled,
    #[serde(rename = "SOURCE_DISABLED")]
    SourceDisabled,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::SourceCreated => write!(f, "SOURCE_CREATED"),
            EventType::SourceUpdated => write!(f, "SOURCE_UPDATED"),
            EventType::SourceDeleted => write!(f, "SOURCE_DELETED"),
            EventType::SourceEnabled => write!(f, "SOURCE_ENABLED"),
            EventType::SourceDisabled => write!(f, "SOURCE_DISABLED"),
        }
    }
}

/// Event envelope as delivered on the stream. `event_id` is the
/// idempotency key; replaying a processed id must be a no-op downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEvent {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub source_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl SourceEvent {
    pub fn new(event_type: EventType, source_id: Uuid, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            source_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_uses_wire_constants() {
        let e = SourceEvent::new(EventType::SourceCreated, Uuid::new_v4(), json!({}));
        let wire = serde_json::to_value(&e).unwrap();
        assert_eq!(wire["event_type"], "SOURCE_CREATED");
    }

    #[test]
    fn envelope_round_trips() {
        let e = SourceEvent::new(
            EventType::SourceDisabled,
            Uuid::new_v4(),
            json!({"reason": "manual"}),
        );
        let wire = serde_json::to_string(&e).unwrap();
        let back: SourceEvent = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.event_id, e.event_id);
        assert_eq!(back.event_type, EventType::SourceDisabled);
        assert_eq!(back.payload["reason"], "manual");
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let wire = json!({
            "event_id": Uuid::new_v4(),
            "event_type": "SOURCE_DELETED",
            "source_id": Uuid::new_v4(),
            "timestamp": Utc::now(),
        });
        let back: SourceEvent = serde_json::from_value(wire).unwrap();
        assert!(back.payload.is_null());
    }
}
