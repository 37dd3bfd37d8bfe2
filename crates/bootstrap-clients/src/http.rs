//! Shared HTTP plumbing for the Gitiles and Gerrit clients.

use std::time::Duration;

use base64::Engine as _;
use bootstrap_services::{Retries, ServiceError, ServiceResult};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{from_reqwest, from_status};

/// Prefix Gerrit and Gitiles put in front of JSON bodies.
const XSSI_PREFIX: &str = ")]}'";

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Drop the anti-XSSI prefix, if present.
pub(crate) fn strip_xssi(body: &str) -> &str {
    body.strip_prefix(XSSI_PREFIX).unwrap_or(body).trim_start()
}

/// Decode a `format=TEXT` body, which is base64 of the raw contents.
pub(crate) fn decode_text(body: &str, what: &str) -> ServiceResult<String> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ServiceError::InvalidResponse(format!("{what}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ServiceError::InvalidResponse(format!("{what}: {e}")))
}

#[derive(Debug, Clone)]
pub(crate) struct HttpFetcher {
    client: reqwest::Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, retries: u32) -> Self {
        Self { client, retries }
    }

    /// GET `url`, retrying transient failures with exponential backoff when
    /// `retries` allows it.
    pub async fn get_text(&self, url: &str, what: &str, retries: Retries) -> ServiceResult<String> {
        let attempts = match retries {
            Retries::Enabled => self.retries + 1,
            Retries::Disabled => 1,
        };
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.get_once(url, what).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(url = %url, attempt = attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
        retries: Retries,
    ) -> ServiceResult<T> {
        let body = self.get_text(url, what, retries).await?;
        Ok(serde_json::from_str(strip_xssi(&body))?)
    }

    async fn get_once(&self, url: &str, what: &str) -> ServiceResult<String> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await.map_err(from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(from_status(status, what));
        }
        response.text().await.map_err(from_reqwest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_xssi() {
        assert_eq!(strip_xssi(")]}'\n{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_xssi("{}"), "{}");
    }

    #[test]
    fn test_decode_text_ignores_line_breaks() {
        // "deps = {}\n"
        let decoded = decode_text("ZGVwcyA9\nIHt9Cg==", "DEPS").unwrap();
        assert_eq!(decoded, "deps = {}\n");
    }

    #[test]
    fn test_decode_text_rejects_garbage() {
        let err = decode_text("not base64!", "DEPS").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidResponse(_)));
    }
}
