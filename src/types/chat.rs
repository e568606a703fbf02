use serde::{Deserialize, Serialize};

pub const USER_ROLE: &str = "user";
pub const MODEL_ROLE: &str = "model";

/// One turn of a conversation as the frontend sends and stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Gemini only knows `user` and `model`; every other role is the assistant.
    pub fn gemini_role(&self) -> &'static str {
        if self.role == USER_ROLE {
            USER_ROLE
        } else {
            MODEL_ROLE
        }
    }
}
