//! Frames written to the client event stream.

use axum::response::sse::Event;

use crate::domain::QueryResponse;

/// One server-sent event: an optional sequence id and a JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Per-subscription sequence number; absent on the liveness frame.
    pub id: Option<u64>,
    /// JSON payload.
    pub data: String,
}

impl StreamFrame {
    /// The empty frame written when a stream opens.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            id: None,
            data: "{}".to_string(),
        }
    }

    /// A patch frame carrying `body` with sequence number `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the body cannot be serialized.
    pub fn patch(id: u64, body: &QueryResponse) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Some(id),
            data: serde_json::to_string(body)?,
        })
    }

    /// Converts the frame into an SSE event.
    #[must_use]
    pub fn into_event(self) -> Event {
        let event = Event::default().data(self.data);
        match self.id {
            Some(id) => event.id(id.to_string()),
            None => event,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{CollectionKind, Snapshot, SubscriptionId};

    #[test]
    fn initial_frame_is_empty_object() {
        let frame = StreamFrame::initial();
        assert_eq!(frame.id, None);
        assert_eq!(frame.data, "{}");
    }

    #[test]
    fn patch_frame_carries_id_and_subscription() {
        let mut patch = Snapshot::new();
        patch.insert_value(CollectionKind::Listing, 4, None);
        let body = QueryResponse::patch(SubscriptionId::new(2), patch);
        let Ok(frame) = StreamFrame::patch(7, &body) else {
            panic!("patch should serialize");
        };
        assert_eq!(frame.id, Some(7));
        assert_eq!(frame.data, r#"{"subscription_id":2,"listings":{"4":null}}"#);
    }
}
