//! Reference image fetching.
//!
//! Accepts data URIs, direct image URLs, and HTML pages whose `og:image` meta tag points
//! at the image (resolved with one extra hop).

use crate::config::ReferenceSettings;
use crate::error::ApiError;
use crate::provider::InlineImage;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Fetched image ready to be passed as a synthesis reference; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
    pub source_url: String,
}

impl ReferenceImage {
    pub fn inline(&self) -> InlineImage {
        InlineImage {
            mime_type: self.mime_type.clone(),
            data: self.data.clone(),
        }
    }
}

/// Reference-image fetch boundary.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ReferenceImage, ApiError>;
}

fn og_image_regexes() -> &'static [Regex; 2] {
    static OG_IMAGE: OnceLock<[Regex; 2]> = OnceLock::new();
    OG_IMAGE.get_or_init(|| {
        [
            Regex::new(
                r#"(?is)<meta[^>]+(?:property|name)\s*=\s*["']og:image(?::url|:secure_url)?["'][^>]*content\s*=\s*["']([^"']+)["']"#,
            )
            .expect("valid og:image regex"),
            Regex::new(
                r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*(?:property|name)\s*=\s*["']og:image(?::url|:secure_url)?["']"#,
            )
            .expect("valid og:image regex"),
        ]
    })
}

/// First `og:image` URL declared in an HTML document.
pub fn find_og_image(html: &str) -> Option<String> {
    og_image_regexes()
        .iter()
        .filter_map(|re| re.captures(html))
        .filter_map(|caps| caps.get(1))
        .min_by_key(|m| m.start())
        .map(|m| m.as_str().replace("&amp;", "&"))
}

/// Fetches references over HTTP(S).
#[derive(Clone)]
pub struct HttpReferenceFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpReferenceFetcher {
    pub fn new(settings: &ReferenceSettings) -> Result<Self, ApiError> {
        Self::from_builder(Client::builder(), settings)
    }

    fn from_builder(
        builder: reqwest::ClientBuilder,
        settings: &ReferenceSettings,
    ) -> Result<Self, ApiError> {
        let client = builder
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }

    fn fetch_error(url: &str, reason: impl Into<String>) -> ApiError {
        ApiError::ReferenceFetch {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Send a GET and return the response with its lowercased media type.
    async fn request(&self, url: &Url) -> Result<(reqwest::Response, String), ApiError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::fetch_error(url.as_str(), e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::fetch_error(url.as_str(), format!("HTTP {}", status)));
        }
        if let Some(length) = response.content_length() {
            if length as usize > self.max_bytes {
                return Err(Self::fetch_error(
                    url.as_str(),
                    format!("{} bytes exceeds limit of {}", length, self.max_bytes),
                ));
            }
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default();
        Ok((response, content_type))
    }

    /// Read the body, giving up as soon as it grows past `max_bytes`.
    ///
    /// Chunked and close-delimited bodies carry no Content-Length, so the cap in
    /// `request` alone does not bound them.
    async fn read_capped(
        &self,
        url: &Url,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, ApiError> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::fetch_error(url.as_str(), e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(Self::fetch_error(
                    url.as_str(),
                    format!("body exceeds limit of {} bytes", self.max_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn read_image(
        &self,
        url: &Url,
        response: reqwest::Response,
        content_type: String,
    ) -> Result<ReferenceImage, ApiError> {
        let bytes = self.read_capped(url, response).await?;
        let inline = InlineImage::from_bytes(content_type, &bytes);
        Ok(ReferenceImage {
            mime_type: inline.mime_type,
            data: inline.data,
            source_url: url.to_string(),
        })
    }

    async fn get(&self, url: &Url) -> Result<ReferenceImage, ApiError> {
        let (response, content_type) = self.request(url).await?;
        if content_type.starts_with("image/") {
            return self.read_image(url, response, content_type).await;
        }
        if content_type != "text/html" {
            return Err(Self::fetch_error(
                url.as_str(),
                format!("unsupported content type '{}'", content_type),
            ));
        }

        let body = self.read_capped(url, response).await?;
        let html = String::from_utf8_lossy(&body);
        let og_image = find_og_image(&html)
            .ok_or_else(|| Self::fetch_error(url.as_str(), "page declares no og:image"))?;
        let target = url
            .join(&og_image)
            .map_err(|e| Self::fetch_error(url.as_str(), format!("bad og:image URL: {}", e)))?;
        debug!(page = %url, image = %target, "Following og:image");

        let (response, content_type) = self.request(&target).await?;
        if !content_type.starts_with("image/") {
            return Err(Self::fetch_error(
                target.as_str(),
                format!("og:image is not an image ('{}')", content_type),
            ));
        }
        let mut image = self.read_image(&target, response, content_type).await?;
        image.source_url = url.to_string();
        Ok(image)
    }
}

#[async_trait]
impl ReferenceFetcher for HttpReferenceFetcher {
    async fn fetch(&self, url: &str) -> Result<ReferenceImage, ApiError> {
        if url.trim_start().starts_with("data:") {
            let inline = InlineImage::from_data_uri(url)
                .ok_or_else(|| Self::fetch_error("data:", "malformed data URI"))?;
            return Ok(ReferenceImage {
                mime_type: inline.mime_type,
                data: inline.data,
                source_url: url.to_string(),
            });
        }
        let parsed = Url::parse(url.trim()).map_err(|e| Self::fetch_error(url, e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => self.get(&parsed).await,
            other => Err(Self::fetch_error(url, format!("unsupported scheme '{}'", other))),
        }
    }
}
