//! Wire types shared by the handlers, the store and the Gemini client.
//!
//! - `chat.rs`: the `{role, content}` message exchanged with clients
//! - `gemini.rs`: `generateContent` request/response payloads
//! - `payloads.rs`: HTTP request and response bodies

pub mod chat;
pub mod gemini;
pub mod payloads;

pub use chat::ChatMessage;
