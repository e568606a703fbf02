use crate::types::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbResult {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub score: f64,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One saved transcript per (user, category); `messages` is stored as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbConversation {
    pub id: i64,
    pub user_id: i64,
    pub category: String,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}
