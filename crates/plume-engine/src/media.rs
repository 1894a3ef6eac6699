//! Image retrieval from the file-sharing host.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("unusable image reference `{0}`")]
    BadReference(String),
}

/// Downloaded image bytes plus enough metadata to cache them locally.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub file_id: String,
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

#[async_trait]
pub trait MediaFetch: Send + Sync {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia, FetchError>;
}

/// Fetches images from a drive-style sharing host by file id.
pub struct DriveMedia {
    client: reqwest::Client,
}

impl Default for DriveMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveMedia {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn download_url(file_id: &str) -> String {
        format!(
            "https://drive.google.com/uc?export=download&id={}",
            file_id
        )
    }
}

#[async_trait]
impl MediaFetch for DriveMedia {
    async fn fetch(&self, reference: &str) -> Result<FetchedMedia, FetchError> {
        let file_id = extract_file_id(reference)
            .ok_or_else(|| FetchError::BadReference(reference.to_string()))?;

        let response = self
            .client
            .get(Self::download_url(&file_id))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let extension = extension_for(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .to_vec();

        Ok(FetchedMedia {
            file_id,
            bytes,
            extension,
        })
    }
}

/// Pull the file id out of a reference: a bare id, or any of the sharing
/// URL shapes (`/file/d/<id>`, `id=<id>`, `/d/<id>`).
pub fn extract_file_id(reference: &str) -> Option<String> {
    static URL_FORMS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"/file/d/([-\w]{25,})|[?&]id=([-\w]{25,})|/d/([-\w]{25,})").unwrap()
    });
    static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-\w]+$").unwrap());

    let reference = reference.trim();
    if let Some(captures) = URL_FORMS.captures(reference) {
        for group in 1..=3 {
            if let Some(m) = captures.get(group) {
                return Some(m.as_str().to_string());
            }
        }
    }

    if BARE_ID.is_match(reference) {
        return Some(reference.to_string());
    }
    None
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("png") => "png",
        Some(ct) if ct.contains("gif") => "gif",
        Some(ct) if ct.contains("webp") => "webp",
        _ => "jpg",
    }
}

/// Temp path the fetched image is cached at for the rest of the run.
pub fn cache_path(file_id: &str, extension: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "plume-media-{}-{}.{}",
        std::process::id(),
        file_id,
        extension
    ))
}
