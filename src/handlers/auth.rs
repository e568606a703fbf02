use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, warn};

use crate::middleware::ValidJson;
use crate::service::auth::MAX_PASSWORD_BYTES;
use crate::types::payloads::{LoginRequest, RegisterRequest, TokenResponse, UserOut};
use crate::{NexusError, router::NexusState};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=80;
const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<NexusState>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserOut>), NexusError> {
    // An empty email field counts as no email.
    let email = req
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());
    validate_registration(&req.username, email, &req.password)?;

    let hashed = state.auth.hash_password(&req.password).await?;
    let user = state.store.create_user(&req.username, email, &hashed).await?;
    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<NexusState>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Json<TokenResponse>, NexusError> {
    let Some(user) = state.store.find_user_by_username(&req.username).await? else {
        warn!(username = %req.username, "login for unknown user");
        return Err(NexusError::InvalidLogin);
    };

    let verified = state
        .auth
        .verify_password(&req.password, &user.hashed_password)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id = user.id, error = %e, "stored password hash unusable");
            false
        });
    if !verified {
        warn!(user_id = user.id, "login with wrong password");
        return Err(NexusError::InvalidLogin);
    }

    let token = state.auth.issue_access_token(&user.username, user.id)?;
    info!(user_id = user.id, "access token issued");
    Ok(Json(TokenResponse::bearer(token)))
}

fn validate_registration(
    username: &str,
    email: Option<&str>,
    password: &str,
) -> Result<(), NexusError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(NexusError::Validation(
            "username must be between 3 and 80 characters".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(NexusError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(NexusError::Validation(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    if let Some(email) = email
        && !is_plausible_email(email)
    {
        return Err(NexusError::Validation("invalid email address".to_string()));
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    if email.contains(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
