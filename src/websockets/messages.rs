use serde::{Deserialize, Serialize};

/// Room-intent messages a client may send over the socket
///
/// Decoded once at the edge; anything that does not decode is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Subscribe to the activity of the principal's restaurant
    JoinRestaurant,
    /// Subscribe to one bill (and the principal's restaurant)
    #[serde(rename_all = "camelCase")]
    JoinBill { bill_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveBill { bill_id: String },
}

impl ClientMessage {
    /// Decodes a raw text frame; malformed JSON and unknown types yield `None`
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Envelope of every event pushed to clients: `{"event": .., "data": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_room_intents() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"joinRestaurant"}"#),
            Some(ClientMessage::JoinRestaurant)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"joinBill","billId":"b1"}"#),
            Some(ClientMessage::JoinBill {
                bill_id: "b1".to_string()
            })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"leaveBill","billId":"b1"}"#),
            Some(ClientMessage::LeaveBill {
                bill_id: "b1".to_string()
            })
        );
    }

    #[test]
    fn test_unparseable_messages_are_dropped() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"dance"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"type":"joinBill"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"billId":"b1"}"#), None);
    }

    #[test]
    fn test_outbound_event_envelope() {
        let event = OutboundEvent::new("staffUpdated", serde_json::Value::Null);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "staffUpdated", "data": null})
        );
    }
}
