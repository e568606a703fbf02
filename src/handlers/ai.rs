use std::convert::Infallible;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

use crate::middleware::ValidJson;
use crate::service::extractor::{DocumentKind, extract_blocking};
use crate::service::prompts::Prompt;
use crate::types::payloads::{ChatPayload, TextPayload};
use crate::{NexusError, router::NexusState};

const UPLOAD_FIELD: &str = "file";

pub async fn generate_todo(
    State(state): State<NexusState>,
    ValidJson(payload): ValidJson<TextPayload>,
) -> Result<Json<Value>, NexusError> {
    let value = state
        .gateway
        .generate_structured(Prompt::Todo, &payload.text)
        .await?;
    Ok(Json(value))
}

pub async fn analyze_mental_health(
    State(state): State<NexusState>,
    ValidJson(payload): ValidJson<TextPayload>,
) -> Result<Json<Value>, NexusError> {
    let value = state
        .gateway
        .generate_structured(Prompt::MentalHealth, &payload.text)
        .await?;
    Ok(Json(value))
}

/// Accepts a PDF or DOCX in the `file` field and analyzes its text.
pub async fn analyze_resume(
    State(state): State<NexusState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, NexusError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        // Reject by declared type before reading the body.
        let kind = DocumentKind::from_mime(field.content_type().unwrap_or_default())?;
        let file_name = field.file_name().unwrap_or("<unnamed>").to_string();
        let bytes = field.bytes().await?;
        info!(file_name = %file_name, size = bytes.len(), "resume received");
        upload = Some((kind, bytes));
        break;
    }

    let (kind, bytes) =
        upload.ok_or_else(|| NexusError::Validation("No file uploaded.".to_string()))?;
    let text = extract_blocking(bytes.to_vec(), kind).await?;
    if text.trim().is_empty() {
        return Err(NexusError::Validation(
            "Could not extract text from the uploaded file.".to_string(),
        ));
    }

    let value = state
        .gateway
        .generate_structured(Prompt::Resume, &text)
        .await?;
    Ok(Json(value))
}

/// Interview chat streamed as plain-text chunks.
///
/// Input problems are reported with a status code; once streaming has begun,
/// failures arrive as a final text chunk.
pub async fn chat(
    State(state): State<NexusState>,
    ValidJson(payload): ValidJson<ChatPayload>,
) -> Result<Response, NexusError> {
    if payload.messages.is_empty() {
        return Err(NexusError::Validation(
            "messages must not be empty".to_string(),
        ));
    }
    let prompts = state.gateway.prompts();
    if !prompts.exists(Prompt::Interview).await {
        return Err(NexusError::PromptMissing(prompts.path(Prompt::Interview)));
    }

    debug!(turns = payload.messages.len(), "starting chat stream");
    let chunks = state
        .gateway
        .stream_chat(Prompt::Interview, payload.messages)
        .map(|event| Ok::<_, Infallible>(event.into_text()));

    Ok((
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(chunks),
    )
        .into_response())
}
