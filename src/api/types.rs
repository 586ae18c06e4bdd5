//! API request and response types

use crate::llm::Turn;
use serde::{Deserialize, Serialize};

/// Query parameters for the generation endpoint. Only these two fields are
/// interpreted; the full query string still participates in the fingerprint.
#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    pub fortune_telling_uid: String,
    pub provider: Option<String>,
}

/// Body of a continuation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequest {
    pub conversation_id: String,
    pub prompt: String,
    pub provider: Option<String>,
}

/// Visible conversation state for a generation request
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub conversation_history: Vec<Turn>,
}

/// Rotating tips and the recommended desk ornament, mined from the first
/// assistant reply
#[derive(Debug, Serialize)]
pub struct DeskDecorResponse {
    pub tips: Vec<String>,
    #[serde(rename = "deskDecor")]
    pub desk_decor: Option<String>,
}

/// Request to register a user profile
#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub fortune_telling_uid: String,
    pub username: String,
    pub gender: String,
    pub birth_date: String,
    pub birth_time: String,
}

/// Response with a single profile
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: serde_json::Value,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
