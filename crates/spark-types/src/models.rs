use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub external_uid: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Onboarding answers attached to a user. Interests are shared across users
/// and linked by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub gender: String,
    #[serde(default)]
    pub pronouns: String,
    #[serde(default)]
    pub sexual_orientation: Vec<String>,
    #[serde(default)]
    pub general_interests: Vec<String>,
    pub opening_question: String,
    #[serde(default)]
    pub dealbreakers: String,
}

/// Lifecycle of a conversation.
///
/// `Pending` until the recipient answers the opening message, then `Active`.
/// `Blocked` is only ever entered by moderation and rejects all further writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Pending,
    Active,
    Blocked,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown conversation status '{}'", other)),
        }
    }
}

/// A two-party conversation. `user_a_id < user_b_id` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub status: ConversationStatus,
    pub message_count: i64,
    pub photos_unlocked: bool,
    pub names_unlocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_opening_message: bool,
    pub created_at: DateTime<Utc>,
}

/// Conversation metadata plus its most recent messages, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetails {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// One row of a user's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPreview {
    pub conversation_id: Uuid,
    pub status: ConversationStatus,
    pub other_user_id: Uuid,
    pub other_user_display_name: String,
    pub last_message: Option<String>,
    pub last_message_sender_id: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
