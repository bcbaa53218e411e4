use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Profile, User};

// -- Users --

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncUserResponse {
    pub user: User,
    /// True when this call created the local user record.
    pub created: bool,
}

/// `GET /v1/me`: the caller's own record plus onboarding answers, if any.
#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub onboarding_profile: Option<Profile>,
}

/// `GET /v1/users/{id}`: what other users may see.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicUserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub onboarding_profile: Option<Profile>,
}

// -- Onboarding --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OnboardingRequest {
    pub gender: String,
    #[serde(default)]
    pub pronouns: String,
    pub sexual_orientation: Vec<String>,
    pub general_interests: Vec<String>,
    pub opening_question: String,
    #[serde(default)]
    pub dealbreakers: String,
}

impl From<OnboardingRequest> for Profile {
    fn from(req: OnboardingRequest) -> Self {
        Self {
            gender: req.gender,
            pronouns: req.pronouns,
            sexual_orientation: req.sexual_orientation,
            general_interests: req.general_interests,
            opening_question: req.opening_question,
            dealbreakers: req.dealbreakers,
        }
    }
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartConversationRequest {
    pub recipient_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
