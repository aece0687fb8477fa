use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to clients over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { identity_id: Uuid, username: String },

    /// Someone wants to start a conversation with the receiver
    ChatRequestReceived {
        request_id: Uuid,
        from_identity: Uuid,
        from_username: String,
        message: String,
    },

    /// A request the receiver sent was accepted
    ChatRequestAccepted {
        request_id: Uuid,
        conversation_id: Uuid,
        contact_id: Uuid,
        contact_username: String,
    },

    /// A request the receiver sent was declined
    ChatRequestDeclined {
        request_id: Uuid,
        contact_id: Uuid,
        contact_username: String,
    },

    /// A new encrypted envelope was stored for the receiver
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_username: String,
        recipient_id: Uuid,
        ciphertext: String,
        signature: String,
        sender_public_key: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reply to a client `Ping`
    Pong,
}

impl GatewayEvent {
    /// Short name used in logs; never includes payload data.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::ChatRequestReceived { .. } => "chat_request_received",
            Self::ChatRequestAccepted { .. } => "chat_request_accepted",
            Self::ChatRequestDeclined { .. } => "chat_request_declined",
            Self::MessageCreate { .. } => "message_create",
            Self::Pong => "pong",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Application-level keepalive, answered with `Pong`
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged() {
        let json = serde_json::to_value(GatewayEvent::Pong).unwrap();
        assert_eq!(json["type"], "Pong");

        let id = Uuid::new_v4();
        let json = serde_json::to_value(GatewayEvent::ChatRequestDeclined {
            request_id: id,
            contact_id: id,
            contact_username: "bob".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "ChatRequestDeclined");
        assert_eq!(json["data"]["contact_username"], "bob");
    }

    #[test]
    fn ping_command_parses() {
        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Ping));

        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Identify","data":{"token":"abc"}}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Identify { token } if token == "abc"));
    }
}
