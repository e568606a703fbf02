use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chat::ChatMessage;
use crate::db::models::{DbConversation, DbResult, DbUser};

/// Body of the text-based AI endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPayload {
    pub text: String,
}

/// Body of the streaming chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOut {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbUser> for UserOut {
    fn from(u: DbUser) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCreate {
    pub category: String,
    pub score: f64,
    #[serde(default)]
    pub meta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultOut {
    pub id: i64,
    pub category: String,
    pub score: f64,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbResult> for ResultOut {
    fn from(r: DbResult) -> Self {
        Self {
            id: r.id,
            category: r.category,
            score: r.score,
            meta: r.meta,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsList {
    pub results: Vec<ResultOut>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationCreate {
    pub category: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationOut {
    pub category: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbConversation> for ConversationOut {
    fn from(c: DbConversation) -> Self {
        Self {
            category: c.category,
            messages: c.messages,
            updated_at: c.updated_at,
        }
    }
}
