use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::middleware::{CurrentUser, ValidJson};
use crate::types::payloads::{
    ConversationCreate, ConversationOut, ResultCreate, ResultOut, ResultsList, UserOut,
};
use crate::{NexusError, router::NexusState};

pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserOut> {
    Json(user.into())
}

pub async fn get_conversation(
    State(state): State<NexusState>,
    CurrentUser(user): CurrentUser,
    Path(category): Path<String>,
) -> Result<Json<ConversationOut>, NexusError> {
    let conv = state.store.get_conversation(user.id, &category).await?;
    Ok(Json(conv.into()))
}

pub async fn save_conversation(
    State(state): State<NexusState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<ConversationCreate>,
) -> Result<Json<ConversationOut>, NexusError> {
    let conv = state
        .store
        .upsert_conversation(user.id, &req.category, &req.messages)
        .await?;
    info!(
        user_id = user.id,
        category = %conv.category,
        turns = conv.messages.len(),
        "conversation saved"
    );
    Ok(Json(conv.into()))
}

pub async fn create_result(
    State(state): State<NexusState>,
    CurrentUser(user): CurrentUser,
    ValidJson(req): ValidJson<ResultCreate>,
) -> Result<(StatusCode, Json<ResultOut>), NexusError> {
    let result = state
        .store
        .create_result(user.id, &req.category, req.score, req.meta.as_deref())
        .await?;
    info!(user_id = user.id, result_id = result.id, category = %result.category, "result recorded");
    Ok((StatusCode::CREATED, Json(result.into())))
}

pub async fn list_results(
    State(state): State<NexusState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ResultsList>, NexusError> {
    let results = state.store.list_results(user.id).await?;
    Ok(Json(ResultsList {
        results: results.into_iter().map(ResultOut::from).collect(),
    }))
}
