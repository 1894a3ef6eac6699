//! Immutable run configuration, read once at process start from a flat
//! name→value map (the environment in production, a literal map in tests).

use crate::creds::Credentials;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOGIN_URL: &str = "https://x.com/i/flow/login";
pub const DEFAULT_COMPOSE_URL: &str = "https://x.com/compose/tweet";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

pub type ConfigMap = BTreeMap<String, String>;

/// Snapshot the process environment into a config map.
pub fn env_map() -> ConfigMap {
    std::env::vars().collect()
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub text: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub image: String,
    pub webhook_url: String,
    pub login_email: Option<String>,
    pub login_username: Option<String>,
    pub login_password: Option<String>,
    pub sheet_csv_url: Option<String>,
    pub login_url: String,
    pub compose_url: String,
    pub step_budget: Duration,
    pub step_poll: Duration,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_map(&env_map())
    }

    /// Build and validate the configuration. Missing required keys are
    /// reported together, by name.
    pub fn from_map(map: &ConfigMap) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            map.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let (text, image, webhook_url) =
            match (get("TEXT"), get("IMAGE"), get("WEBHOOK_URL")) {
                (Some(text), Some(image), Some(webhook_url)) => (text, image, webhook_url),
                (text, image, webhook_url) => {
                    let missing = [
                        ("TEXT", text),
                        ("IMAGE", image),
                        ("WEBHOOK_URL", webhook_url),
                    ]
                    .into_iter()
                    .filter(|(_, value)| value.is_none())
                    .map(|(key, _)| key.to_string())
                    .collect();
                    return Err(ConfigError::Missing(missing));
                }
            };

        validate_url("WEBHOOK_URL", &webhook_url)?;

        let sheet_csv_url = get("SHEET_CSV_URL");
        if let Some(url) = &sheet_csv_url {
            validate_url("SHEET_CSV_URL", url)?;
        }

        let step_budget = parse_secs(map, "STEP_BUDGET_SECS")?.unwrap_or(crate::step::DEFAULT_BUDGET);
        let step_poll =
            parse_millis(map, "STEP_POLL_MILLIS")?.unwrap_or(crate::step::DEFAULT_POLL);

        Ok(Self {
            text,
            date: get("DATE"),
            time: get("TIME"),
            image,
            webhook_url,
            login_email: get("LOGIN_EMAIL"),
            login_username: get("LOGIN_USERNAME"),
            login_password: get("LOGIN_PASSWORD"),
            sheet_csv_url,
            login_url: get("LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            compose_url: get("COMPOSE_URL").unwrap_or_else(|| DEFAULT_COMPOSE_URL.to_string()),
            step_budget,
            step_poll,
        })
    }

    /// Post body: the text, optionally prefixed by a `DATE TIME` line.
    pub fn compose_body(&self) -> String {
        let prefix = match (&self.date, &self.time) {
            (Some(date), Some(time)) => Some(format!("{} {}", date, time)),
            (Some(date), None) => Some(date.clone()),
            (None, Some(time)) => Some(time.clone()),
            (None, None) => None,
        };
        match prefix {
            Some(prefix) => format!("{}\n{}", prefix, self.text),
            None => self.text.clone(),
        }
    }
}

/// The external input to one run: what to post and as whom. Built once
/// after credential resolution, never mutated.
#[derive(Debug, Clone)]
pub struct PostRequest {
    pub body: String,
    pub image: String,
    pub credentials: Credentials,
}

impl PostRequest {
    pub fn new(config: &RunConfig, credentials: Credentials) -> Self {
        Self {
            body: config.compose_body(),
            image: config.image.clone(),
            credentials,
        }
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map(|_| ()).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs(map: &ConfigMap, key: &str) -> Result<Option<Duration>, ConfigError> {
    parse_u64(map, key).map(|v| v.map(Duration::from_secs))
}

fn parse_millis(map: &ConfigMap, key: &str) -> Result<Option<Duration>, ConfigError> {
    parse_u64(map, key).map(|v| v.map(Duration::from_millis))
}

fn parse_u64(map: &ConfigMap, key: &str) -> Result<Option<u64>, ConfigError> {
    match map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected an integer, got `{}`", raw),
        }),
    }
}
