use bytes::Bytes;
use tracing::{debug, error};

use spark_types::events::ChatEvent;
use spark_types::models::Message;

use crate::hub::Hub;

/// Push a committed message to the live viewers of its conversation.
///
/// Only call this after the write that produced `message` has committed.
/// Delivery is best-effort: failures are logged and never reported back to
/// the writer. Returns the number of viewers the message was queued for.
pub fn deliver_message(hub: &Hub, message: &Message) -> usize {
    let event = ChatEvent::MessageCreate(message.clone());
    let payload = match serde_json::to_vec(&event) {
        Ok(json) => Bytes::from(json),
        Err(e) => {
            error!("Failed to serialize message {}: {}", message.id, e);
            return 0;
        }
    };

    let delivered = hub.broadcast(message.conversation_id, payload);
    debug!(
        "Message {} delivered to {} live viewer(s) of {}",
        message.id, delivered, message.conversation_id
    );
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ViewerHandle;
    use uuid::Uuid;

    #[test]
    fn delivers_message_create_event_to_viewers() {
        let hub = Hub::new();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hey".into(),
            is_opening_message: false,
            created_at: chrono::Utc::now(),
        };

        assert_eq!(deliver_message(&hub, &message), 0);

        let (viewer, mut rx) = ViewerHandle::channel();
        hub.join(message.conversation_id, viewer);
        assert_eq!(deliver_message(&hub, &message), 1);

        let payload = rx.try_recv().unwrap();
        let event: ChatEvent = serde_json::from_slice(&payload).unwrap();
        match event {
            ChatEvent::MessageCreate(received) => assert_eq!(received, message),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
