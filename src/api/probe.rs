use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server answered with status {0}")]
    Status(StatusCode),

    #[error("Content-Length missing or unreadable")]
    NoLength,
}

/// Learns a remote file's size through a metadata-only request.
///
/// Size information is a best-effort enhancement: any failure is logged and
/// surfaces as `None`, never as an error to the caller.
pub struct SizeProbe {
    client: Client,
}

impl Default for SizeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SizeProbe {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    pub async fn probe_length(&self, url: &str) -> Option<u64> {
        match self.head_length(url).await {
            Ok(length) => Some(length),
            Err(err) => {
                log::debug!("Size probe for {url} failed: {err}");
                None
            }
        }
    }

    async fn head_length(&self, url: &str) -> Result<u64, ProbeError> {
        let response = self.client.head(url).send().await?;

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status()));
        }

        // A zero-length answer is as useless as a missing header
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|length| *length > 0)
            .ok_or(ProbeError::NoLength)
    }
}
