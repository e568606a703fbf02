//! Structured generation and streaming chat on top of a [`GeminiTransport`].
//!
//! The gateway is built once at startup and shared read-only by every request.
//! It owns the two model handles (JSON output and chat output) and the prompt
//! registry; it keeps no per-request state.

use crate::api::{GeminiApi, GeminiStream, GeminiTransport};
use crate::config::Config;
use crate::error::NexusError;
use crate::service::prompts::{Prompt, PromptRegistry, render};
use crate::types::ChatMessage;
use crate::types::chat::USER_ROLE;
use crate::types::gemini::{Content, GenerateContentRequest, GenerationConfig};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Sent in place of the rest of a chat reply once the stream has failed.
pub const CHAT_ERROR_MESSAGE: &str = "Sorry, an internal error occurred while processing the chat.";

/// A model name bound to the sampling parameters used with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelHandle {
    pub name: String,
    pub generation_config: GenerationConfig,
}

impl ModelHandle {
    pub fn json(name: &str) -> Self {
        Self {
            name: name.to_string(),
            generation_config: GenerationConfig::json(),
        }
    }

    pub fn chat(name: &str) -> Self {
        Self {
            name: name.to_string(),
            generation_config: GenerationConfig::chat(),
        }
    }
}

/// One item of a chat reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Delta(String),
    /// Terminal; nothing follows it.
    Failed,
}

impl ChatEvent {
    /// Wire form: failures are reported as an ordinary text chunk.
    pub fn into_text(self) -> String {
        match self {
            ChatEvent::Delta(text) => text,
            ChatEvent::Failed => CHAT_ERROR_MESSAGE.to_string(),
        }
    }
}

pub struct AiGateway {
    transport: Arc<dyn GeminiTransport>,
    prompts: PromptRegistry,
    json_model: ModelHandle,
    chat_model: ModelHandle,
}

impl AiGateway {
    pub fn new(
        transport: Arc<dyn GeminiTransport>,
        prompts: PromptRegistry,
        model_name: &str,
    ) -> Self {
        Self {
            transport,
            prompts,
            json_model: ModelHandle::json(model_name),
            chat_model: ModelHandle::chat(model_name),
        }
    }

    /// Build the Gemini client and model handles; fails without an API key.
    pub fn from_config(cfg: &Config) -> Result<Self, NexusError> {
        let api_key = cfg.api_key().ok_or(NexusError::MissingCredential)?;
        let api = GeminiApi::new(cfg, api_key)?;
        info!(model = %cfg.gemini_model, "Gemini models initialized");
        Ok(Self::new(
            Arc::new(api),
            PromptRegistry::new(&cfg.prompts_dir),
            &cfg.gemini_model,
        ))
    }

    pub fn prompts(&self) -> &PromptRegistry {
        &self.prompts
    }

    /// Fill `prompt` with `user_text`, make one JSON-mode call and parse the reply.
    pub async fn generate_structured(
        &self,
        prompt: Prompt,
        user_text: &str,
    ) -> Result<Value, NexusError> {
        info!(prompt = prompt.file_name(), "generating structured response");
        let template = self.prompts.load(prompt).await?;
        let request = GenerateContentRequest::single_turn(
            render(&template, user_text),
            self.json_model.generation_config.clone(),
        );

        let response = self
            .transport
            .generate(&self.json_model.name, &request)
            .await?;
        let text = response.text().ok_or_else(|| {
            error!(prompt = prompt.file_name(), "model response had no text");
            NexusError::EmptyModelResponse
        })?;
        serde_json::from_str(&text).map_err(NexusError::InvalidResponseFormat)
    }

    /// Stream a reply to `messages`, the last of which is the turn being answered.
    ///
    /// The returned stream is lazy: nothing is sent upstream until it is first
    /// polled, and upstream chunks are pulled only as the consumer asks for
    /// them. Dropping it drops the upstream connection. Any failure ends the
    /// stream with a single [`ChatEvent::Failed`].
    pub fn stream_chat(
        &self,
        prompt: Prompt,
        messages: Vec<ChatMessage>,
    ) -> BoxStream<'static, ChatEvent> {
        let transport = Arc::clone(&self.transport);
        let prompts = self.prompts.clone();
        let model = self.chat_model.clone();

        let opened = async move {
            let system_instruction = prompts.load(prompt).await?;
            let request = chat_request(&system_instruction, messages, &model.generation_config)?;
            debug!(turns = request.contents.len(), "opening chat stream");
            transport.stream_generate(&model.name, &request).await
        };

        stream::once(opened)
            .flat_map(|opened| match opened {
                Ok(upstream) => relay(upstream),
                Err(e) => {
                    error!(error = %e, "failed to open chat stream");
                    stream::iter([ChatEvent::Failed]).boxed()
                }
            })
            .boxed()
    }
}

/// History turns keep their order; the final message becomes a `user` turn
/// prefixed with the system instruction.
fn chat_request(
    system_instruction: &str,
    mut messages: Vec<ChatMessage>,
    generation_config: &GenerationConfig,
) -> Result<GenerateContentRequest, NexusError> {
    let current = messages
        .pop()
        .ok_or_else(|| NexusError::Validation("messages must not be empty".to_string()))?;

    let mut contents: Vec<Content> = messages.into_iter().map(Content::from).collect();
    contents.push(Content::new(
        USER_ROLE,
        format!("{system_instruction}\n\n{}", current.content),
    ));

    Ok(GenerateContentRequest {
        contents,
        generation_config: generation_config.clone(),
    })
}

fn relay(upstream: GeminiStream) -> BoxStream<'static, ChatEvent> {
    stream::unfold(Some(upstream), |state| async move {
        let mut upstream = state?;
        loop {
            match upstream.next().await {
                Some(Ok(chunk)) => {
                    if let Some(text) = chunk.text() {
                        return Some((ChatEvent::Delta(text), Some(upstream)));
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "chat stream failed mid-response");
                    return Some((ChatEvent::Failed, None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}
