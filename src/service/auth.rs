//! Password hashing and bearer tokens.
//!
//! Tokens are stateless HS256 JWTs carrying the username (`sub`), the numeric
//! user id and an absolute expiry. Validity depends only on the signature and
//! `exp`; nothing is persisted.

use crate::config::Config;
use crate::db::{DbUser, UserStore};
use crate::error::NexusError;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// bcrypt only hashes the first 72 bytes of its input.
pub const MAX_PASSWORD_BYTES: usize = 72;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    pub exp: i64,
}

/// Identity recovered from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub username: String,
    pub user_id: i64,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(secret: &str, token_ttl: Duration, bcrypt_cost: u32) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl,
            bcrypt_cost,
        }
    }

    /// Fails when the token lifetime or bcrypt cost is out of range.
    pub fn from_config(cfg: &Config) -> Result<Self, NexusError> {
        Ok(Self::new(
            &cfg.jwt_secret,
            cfg.token_ttl()?,
            cfg.checked_bcrypt_cost()?,
        ))
    }

    /// Hash a password using bcrypt on the blocking pool.
    ///
    /// Passwords longer than [`MAX_PASSWORD_BYTES`] are rejected rather than
    /// truncated.
    pub async fn hash_password(&self, password: &str) -> Result<String, NexusError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Err(NexusError::Validation(format!(
                "password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hash)
    }

    /// Verify a password against a hash produced by [`Self::hash_password`].
    /// A password that could never have been hashed never matches.
    pub async fn verify_password(&self, password: &str, hash: &str) -> Result<bool, NexusError> {
        if password.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }
        let password = password.to_string();
        let hash = hash.to_string();
        let ok = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
        Ok(ok)
    }

    /// Token with the configured lifetime.
    pub fn issue_access_token(&self, username: &str, user_id: i64) -> Result<String, NexusError> {
        self.issue_token(username, user_id, self.token_ttl)
    }

    pub fn issue_token(
        &self,
        username: &str,
        user_id: i64,
        ttl: Duration,
    ) -> Result<String, NexusError> {
        let expires_at = Utc::now().checked_add_signed(ttl).ok_or_else(|| {
            NexusError::InvalidConfig(format!("token lifetime {ttl} overflows"))
        })?;
        let claims = Claims {
            sub: username.to_string(),
            user_id,
            exp: expires_at.timestamp(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData, NexusError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(TokenData {
            username: data.claims.sub,
            user_id: data.claims.user_id,
        })
    }

    /// Validate `token` and load the user it names.
    ///
    /// The row is looked up by `user_id` and must still carry the token's
    /// username, so a token outlives neither its user nor a re-registration
    /// under the same name.
    pub async fn resolve_current_user(
        &self,
        store: &UserStore,
        token: &str,
    ) -> Result<DbUser, NexusError> {
        let data = self.validate_token(token).inspect_err(|e| {
            debug!(error = %e, "bearer token rejected");
        })?;
        store
            .find_user_by_id(data.user_id)
            .await?
            .filter(|user| user.username == data.username)
            .ok_or(NexusError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::tests::temp_store;

    fn service() -> AuthService {
        AuthService::new("secret", Duration::minutes(60), 4)
    }

    #[tokio::test]
    async fn password_hashing() {
        let auth = service();
        let hash = auth.hash_password("my_secure_password").await.unwrap();
        assert!(auth.verify_password("my_secure_password", &hash).await.unwrap());
        assert!(!auth.verify_password("wrong_password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn hashes_are_salted() {
        let auth = service();
        let a = auth.hash_password("same").await.unwrap();
        let b = auth.hash_password("same").await.unwrap();
        assert_ne!(a, b);
        assert!(auth.verify_password("same", &a).await.unwrap());
        assert!(auth.verify_password("same", &b).await.unwrap());
    }

    #[test]
    fn token_round_trip() {
        let auth = service();
        let token = auth.issue_access_token("alice", 7).unwrap();
        let data = auth.validate_token(&token).unwrap();
        assert_eq!(
            data,
            TokenData {
                username: "alice".to_string(),
                user_id: 7
            }
        );
    }

    #[test]
    fn tampered_signature_fails() {
        let auth = service();
        let token = auth.issue_access_token("alice", 7).unwrap();
        let (head, sig) = token.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let tampered = format!("{head}.{flipped}{}", &sig[1..]);
        assert!(matches!(
            auth.validate_token(&tampered),
            Err(NexusError::InvalidCredential(_))
        ));

        let other = AuthService::new("another-secret", Duration::minutes(60), 4);
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn expired_token_fails() {
        let auth = service();
        let token = auth.issue_token("alice", 7, Duration::minutes(-5)).unwrap();
        assert!(matches!(
            auth.validate_token(&token),
            Err(NexusError::InvalidCredential(_))
        ));
    }

    #[test]
    fn token_without_user_id_fails() {
        #[derive(Serialize)]
        struct Partial {
            sub: String,
            exp: i64,
        }
        let auth = service();
        let token = encode(
            &Header::default(),
            &Partial {
                sub: "alice".into(),
                exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            },
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(auth.validate_token(&token).is_err());
    }

    #[tokio::test]
    async fn resolve_current_user_requires_existing_subject() {
        let store = temp_store().await;
        let auth = service();
        let user = store.create_user("alice", None, "h").await.unwrap();

        let token = auth.issue_access_token("alice", user.id).unwrap();
        let resolved = auth.resolve_current_user(&store, &token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        store.delete_user(user.id).await.unwrap();
        let err = auth.resolve_current_user(&store, &token).await.unwrap_err();
        assert!(matches!(err, NexusError::UserNotFound));

        let err = auth
            .resolve_current_user(&store, "not-a-token")
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn passwords_sharing_a_72_byte_prefix_do_not_collide() {
        let auth = service();
        let prefix = "a".repeat(MAX_PASSWORD_BYTES);
        let exact = auth.hash_password(&prefix).await.unwrap();
        assert!(auth.verify_password(&prefix, &exact).await.unwrap());
        assert!(
            !auth
                .verify_password(&format!("{prefix}totally-different"), &exact)
                .await
                .unwrap()
        );

        let err = auth
            .hash_password(&format!("{prefix}correct"))
            .await
            .unwrap_err();
        assert!(matches!(err, NexusError::Validation(_)));
    }

    #[test]
    fn huge_token_lifetime_is_an_error_not_a_panic() {
        let auth = service();
        let err = auth
            .issue_token("alice", 1, Duration::MAX)
            .unwrap_err();
        assert!(matches!(err, NexusError::InvalidConfig(_)));

        let cfg = Config {
            access_token_expire_minutes: 1_000_000_000_000,
            ..Config::default()
        };
        assert!(matches!(
            AuthService::from_config(&cfg),
            Err(NexusError::InvalidConfig(_))
        ));

        let cfg = Config {
            bcrypt_cost: 99,
            ..Config::default()
        };
        assert!(matches!(
            AuthService::from_config(&cfg),
            Err(NexusError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn token_for_reused_username_is_rejected() {
        let store = temp_store().await;
        let auth = service();
        let first = store.create_user("alice", None, "h").await.unwrap();
        let stale = auth.issue_access_token("alice", first.id).unwrap();

        store.delete_user(first.id).await.unwrap();
        let second = store.create_user("alice", None, "h").await.unwrap();
        assert_ne!(first.id, second.id);

        let err = auth.resolve_current_user(&store, &stale).await.unwrap_err();
        assert!(matches!(err, NexusError::UserNotFound));
        let fresh = auth.issue_access_token("alice", second.id).unwrap();
        assert_eq!(
            auth.resolve_current_user(&store, &fresh).await.unwrap().id,
            second.id
        );
    }
}
