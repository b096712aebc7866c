use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::config::BeekeeperConfig;
use crate::error::{Error, Result};

/// Issues GET requests against one service root and decodes JSON bodies.
/// Non-2xx statuses and undecodable bodies become [`Error::Fetch`].
#[derive(Debug, Clone)]
pub struct JsonHttp {
    http: Client,
    base_url: Url,
}

impl JsonHttp {
    pub fn new(config: &BeekeeperConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `segments` are appended percent-encoded; empty segments are skipped.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::Config(format!("base url cannot take path segments: {}", self.base_url))
            })?;
            path.pop_if_empty();
            for segment in segments.iter().filter(|segment| !segment.is_empty()) {
                path.push(segment);
            }
        }
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "GET");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|err| Error::Fetch {
                url: url.to_string(),
                status: err.status(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|err| Error::Fetch {
            url: url.to_string(),
            status: Some(status),
            message: format!("failed to read response body: {err}"),
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            let message = if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                text
            };
            tracing::debug!(%url, %status, "request rejected");
            return Err(Error::Fetch {
                url: url.to_string(),
                status: Some(status),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|err| Error::Fetch {
            url: url.to_string(),
            status: Some(status),
            message: format!("malformed JSON: {err}"),
        })
    }
}

fn normalize_base_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    let url = format!("{}/", with_scheme.trim_end_matches('/'));
    Url::parse(&url).map_err(|err| Error::Config(format!("invalid base url '{input}': {err}")))
}
