use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use tracing::debug;

use crate::NexusError;
use crate::db::DbUser;
use crate::router::NexusState;

/// The user named by a valid `Authorization: Bearer <token>` header.
///
/// Rejects with 401 when the header is missing or malformed, the token does
/// not validate, or its subject no longer exists.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub DbUser);

impl FromRequestParts<NexusState> for CurrentUser {
    type Rejection = NexusError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &NexusState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    debug!(reason = %rejection, "missing bearer credentials");
                    NexusError::Unauthorized
                })?;

        let user = state
            .auth
            .resolve_current_user(&state.store, bearer.token())
            .await?;
        Ok(Self(user))
    }
}
