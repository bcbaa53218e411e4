use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed to live viewers of a conversation over the chat socket.
///
/// The socket is receive-only from the client's point of view; there is no
/// matching command enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    /// Server confirms the viewer was admitted to the conversation
    Ready { conversation_id: Uuid, user_id: Uuid },

    /// A message was committed to the conversation
    MessageCreate(Message),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_create_uses_type_and_data_envelope() {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hey".into(),
            is_opening_message: false,
            created_at: chrono::Utc::now(),
        };
        let event = ChatEvent::MessageCreate(message.clone());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "MessageCreate");
        assert_eq!(value["data"]["content"], "hey");
        assert_eq!(value["data"]["conversation_id"], message.conversation_id.to_string());
    }
}
