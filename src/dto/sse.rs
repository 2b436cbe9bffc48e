use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::league::{LeagueView, SyncStatusView};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    /// Event name, if any.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Build an event from its name and payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Sent first on every new league stream.
pub struct Handshake {
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a healthy storage backend.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever a new league revision is published, local or remote.
pub struct LeagueUpdatedEvent(pub LeagueView);

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever the sync status changes.
pub struct SyncStatusEvent(pub SyncStatusView);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_event_carries_name_and_payload() {
        let event = ServerEvent::json(
            Some("handshake".to_string()),
            &Handshake {
                message: "hello".into(),
                degraded: false,
            },
        )
        .unwrap();

        assert_eq!(event.event.as_deref(), Some("handshake"));
        assert_eq!(event.data, r#"{"message":"hello","degraded":false}"#);
    }
}
