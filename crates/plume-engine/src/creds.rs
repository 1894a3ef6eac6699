//! Login credential resolution.
//!
//! Direct configuration wins; the spreadsheet CSV export is a fallback
//! consulted only when the identifier or secret is missing. A sheet that
//! cannot be fetched means "no fallback available", nothing more.

use crate::config::RunConfig;
use crate::media::FetchError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "no usable login credentials; set LOGIN_EMAIL and LOGIN_PASSWORD or provide SHEET_CSV_URL"
    )]
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    /// Handle for the optional confirmation screen the site sometimes shows.
    pub username: Option<String>,
    pub password: String,
}

#[async_trait]
pub trait SheetFetch: Send + Sync {
    async fn fetch_csv(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches the CSV export over HTTP.
pub struct HttpSheet {
    client: reqwest::Client,
}

impl Default for HttpSheet {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSheet {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SheetFetch for HttpSheet {
    async fn fetch_csv(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))
    }
}

/// Resolve credentials for the run.
///
/// When both direct values are present they are used verbatim and the sheet
/// is never fetched.
pub async fn resolve(
    config: &RunConfig,
    sheet: &dyn SheetFetch,
) -> Result<Credentials, CredentialError> {
    if let (Some(email), Some(password)) = (&config.login_email, &config.login_password) {
        return Ok(Credentials {
            email: email.clone(),
            username: config.login_username.clone(),
            password: password.clone(),
        });
    }

    let mut fallback = BTreeMap::new();
    if let Some(url) = &config.sheet_csv_url {
        match sheet.fetch_csv(url).await {
            Ok(csv) => {
                fallback = parse_key_values(&csv);
                info!("credential sheet supplied {} entries", fallback.len());
            }
            Err(e) => warn!("credential sheet unavailable: {}", e),
        }
    }

    let email = config
        .login_email
        .clone()
        .or_else(|| fallback.get("LOGIN_EMAIL").cloned());
    let password = config
        .login_password
        .clone()
        .or_else(|| fallback.get("LOGIN_PASSWORD").cloned());
    let username = config
        .login_username
        .clone()
        .or_else(|| fallback.get("LOGIN_USERNAME").cloned());

    match (email, password) {
        (Some(email), Some(password)) => Ok(Credentials {
            email,
            username,
            password,
        }),
        _ => Err(CredentialError::Unresolved),
    }
}

/// Parse a two-column key/value table out of a CSV export.
///
/// Split at the first comma of each line; strip one layer of wrapping
/// quotes; skip blank lines, entries with an empty side, and an optional
/// header row.
pub fn parse_key_values(csv: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (row, line) in csv.lines().enumerate() {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        let Some(comma) = line.find(',') else {
            continue;
        };
        let key = unquote(&line[..comma]);
        let value = unquote(&line[comma + 1..]);
        if row == 0 && is_header(&key) {
            continue;
        }
        if key.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(key, value);
    }
    map
}

fn unquote(cell: &str) -> String {
    let cell = cell.trim();
    let cell = cell
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(cell);
    cell.replace("\"\"", "\"")
}

fn is_header(key: &str) -> bool {
    key.eq_ignore_ascii_case("key") || key.eq_ignore_ascii_case("name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigMap;

    #[test]
    fn parses_plain_rows() {
        let map = parse_key_values("LOGIN_EMAIL,bot@example.com\nLOGIN_PASSWORD,hunter2\n");
        assert_eq!(map.get("LOGIN_EMAIL").unwrap(), "bot@example.com");
        assert_eq!(map.get("LOGIN_PASSWORD").unwrap(), "hunter2");
    }

    #[test]
    fn tolerates_header_quotes_and_blank_lines() {
        let csv = "key,value\r\n\"LOGIN_EMAIL\",\"bot@example.com\"\n\n,orphan\nnokey,\n";
        let map = parse_key_values(csv);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("LOGIN_EMAIL").unwrap(), "bot@example.com");
    }

    #[test]
    fn value_keeps_commas_past_the_first() {
        let map = parse_key_values("NOTE,one,two,three\n");
        assert_eq!(map.get("NOTE").unwrap(), "one,two,three");
    }

    #[test]
    fn unescapes_doubled_quotes() {
        let map = parse_key_values("GREETING,\"say \"\"hi\"\"\"\n");
        assert_eq!(map.get("GREETING").unwrap(), "say \"hi\"");
    }

    struct PanicSheet;

    #[async_trait]
    impl SheetFetch for PanicSheet {
        async fn fetch_csv(&self, _url: &str) -> Result<String, FetchError> {
            panic!("fallback must not be consulted when direct values are present");
        }
    }

    struct FailingSheet;

    #[async_trait]
    impl SheetFetch for FailingSheet {
        async fn fetch_csv(&self, _url: &str) -> Result<String, FetchError> {
            Err(FetchError::Transport("connection refused".to_string()))
        }
    }

    fn config_with(entries: &[(&str, &str)]) -> RunConfig {
        let mut map = ConfigMap::from([
            ("TEXT".to_string(), "hello".to_string()),
            ("IMAGE".to_string(), "abc123".to_string()),
            (
                "WEBHOOK_URL".to_string(),
                "https://hooks.example.com/T/B".to_string(),
            ),
        ]);
        for (k, v) in entries {
            map.insert(k.to_string(), v.to_string());
        }
        RunConfig::from_map(&map).unwrap()
    }

    #[tokio::test]
    async fn direct_values_short_circuit_the_sheet() {
        let config = config_with(&[
            ("LOGIN_EMAIL", "bot@example.com"),
            ("LOGIN_PASSWORD", "hunter2"),
            ("SHEET_CSV_URL", "https://sheets.example.com/export"),
        ]);
        let creds = resolve(&config, &PanicSheet).await.unwrap();
        assert_eq!(creds.email, "bot@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[tokio::test]
    async fn sheet_transport_error_alone_is_not_fatal_until_nothing_resolves() {
        let config = config_with(&[("SHEET_CSV_URL", "https://sheets.example.com/export")]);
        let err = resolve(&config, &FailingSheet).await.unwrap_err();
        assert!(matches!(err, CredentialError::Unresolved));
    }

    #[tokio::test]
    async fn missing_everything_is_unresolved() {
        let config = config_with(&[]);
        let err = resolve(&config, &FailingSheet).await.unwrap_err();
        assert!(matches!(err, CredentialError::Unresolved));
    }
}
