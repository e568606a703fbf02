use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use url::Url;

use crate::error::NexusError;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Token lifetimes accepted from `ACCESS_TOKEN_EXPIRE_MINUTES`, up to one year.
pub const TOKEN_TTL_MINUTES: RangeInclusive<i64> = 1..=525_600;
/// Work factors bcrypt accepts.
pub const BCRYPT_COSTS: RangeInclusive<u32> = 4..=31;

/// Environment keys read by [`Config::load`]. Matching is case-insensitive,
/// so `JWT_SECRET` fills `jwt_secret`.
const ENV_KEYS: [&str; 12] = [
    "listen_addr",
    "loglevel",
    "database_url",
    "jwt_secret",
    "access_token_expire_minutes",
    "bcrypt_cost",
    "gemini_api_key",
    "gemini_model",
    "gemini_base_url",
    "proxy",
    "prompts_dir",
    "max_upload_bytes",
];

/// Process-wide settings, built once in `main` and handed to the components
/// that need them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub loglevel: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub bcrypt_cost: u32,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Url,
    pub proxy: Option<Url>,
    pub prompts_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            database_url: "sqlite://app.db".to_string(),
            jwt_secret: "change-this-secret".to_string(),
            access_token_expire_minutes: 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_base_url: Url::parse(GEMINI_BASE_URL).expect("static Gemini base URL is valid"),
            proxy: None,
            prompts_dir: PathBuf::from("prompts"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults overlaid with raw environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default())).merge(Env::raw().only(&ENV_KEYS))
    }

    pub fn token_ttl(&self) -> Result<chrono::Duration, NexusError> {
        let minutes = self.access_token_expire_minutes;
        if !TOKEN_TTL_MINUTES.contains(&minutes) {
            return Err(NexusError::InvalidConfig(format!(
                "ACCESS_TOKEN_EXPIRE_MINUTES must be within {}..={}, got {minutes}",
                TOKEN_TTL_MINUTES.start(),
                TOKEN_TTL_MINUTES.end()
            )));
        }
        chrono::Duration::try_minutes(minutes).ok_or_else(|| {
            NexusError::InvalidConfig(format!("token lifetime of {minutes} minutes overflows"))
        })
    }

    pub fn checked_bcrypt_cost(&self) -> Result<u32, NexusError> {
        if BCRYPT_COSTS.contains(&self.bcrypt_cost) {
            Ok(self.bcrypt_cost)
        } else {
            Err(NexusError::InvalidConfig(format!(
                "BCRYPT_COST must be within {}..={}, got {}",
                BCRYPT_COSTS.start(),
                BCRYPT_COSTS.end(),
                self.bcrypt_cost
            )))
        }
    }

    /// The API key, if one is configured and not blank.
    pub fn api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.access_token_expire_minutes, 60);
        assert_eq!(cfg.token_ttl().unwrap(), chrono::Duration::minutes(60));
        assert_eq!(cfg.checked_bcrypt_cost().unwrap(), bcrypt::DEFAULT_COST);
        assert_eq!(cfg.gemini_model, "gemini-2.5-flash");
        assert!(cfg.gemini_base_url.as_str().ends_with('/'));
        assert!(cfg.api_key().is_none());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let cfg = Config {
            gemini_api_key: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(cfg.api_key().is_none());
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Serialized::default("access_token_expire_minutes", 5))
            .merge(Serialized::default("gemini_api_key", "k"))
            .extract()
            .expect("config should extract");
        assert_eq!(cfg.access_token_expire_minutes, 5);
        assert_eq!(cfg.api_key(), Some("k"));
        assert_eq!(cfg.jwt_secret, "change-this-secret");
    }

    #[test]
    fn token_lifetime_is_bounded() {
        for minutes in [0, -5, 1_000_000_000_000, i64::MAX] {
            let cfg = Config {
                access_token_expire_minutes: minutes,
                ..Config::default()
            };
            assert!(
                matches!(cfg.token_ttl(), Err(NexusError::InvalidConfig(_))),
                "{minutes} accepted"
            );
        }
        let cfg = Config {
            access_token_expire_minutes: *TOKEN_TTL_MINUTES.end(),
            ..Config::default()
        };
        assert_eq!(cfg.token_ttl().unwrap(), chrono::Duration::days(365));
    }

    #[test]
    fn bcrypt_cost_outside_supported_range_is_rejected() {
        for cost in [0, 3, 32, 100] {
            let cfg = Config {
                bcrypt_cost: cost,
                ..Config::default()
            };
            assert!(matches!(
                cfg.checked_bcrypt_cost(),
                Err(NexusError::InvalidConfig(_))
            ));
        }
        let cfg = Config {
            bcrypt_cost: 4,
            ..Config::default()
        };
        assert_eq!(cfg.checked_bcrypt_cost().unwrap(), 4);
    }
}
