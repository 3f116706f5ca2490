//! HTTP clients for the clinic backend
//!
//! Thin pass-through clients, no retries. The backend reports failures in
//! the response body (`{"error": ...}`) rather than through HTTP status
//! codes alone, so both calls decode the body first and treat an `error`
//! key as a rejection whatever the status line said.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::form::Submission;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend rejected the request: {0}")]
    Backend(String),

    #[error("undecodable backend response: {0}")]
    Decode(String),

    #[error("invalid audio payload: {0}")]
    InvalidAudio(String),
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    paraphrased_text: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    message: Option<String>,
    error: Option<String>,
}

/// Client for the clinic backend's transcription and save endpoints
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Upload a recorded clip and get back the paraphrased transcription
    /// destined for `field`
    pub async fn transcribe(&self, field: &str, wav_bytes: Vec<u8>) -> Result<String, ApiError> {
        if wav_bytes.is_empty() {
            return Err(ApiError::InvalidAudio("empty clip".into()));
        }
        info!(%field, bytes = wav_bytes.len(), "uploading clip for transcription");

        let audio = Part::bytes(wav_bytes)
            .file_name("recording.wav")
            .mime_str("audio/wav")
            .map_err(|e| ApiError::InvalidAudio(e.to_string()))?;
        let form = Form::new()
            .part("audio", audio)
            .text("field", field.to_string());

        let response = self
            .http
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: TranscribeResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{e} (status {status})")))?;

        if let Some(error) = parsed.error {
            warn!(%field, %error, "backend rejected the clip");
            return Err(ApiError::Backend(error));
        }
        match parsed.paraphrased_text {
            Some(text) => {
                info!(%field, chars = text.len(), "clip transcribed");
                Ok(text)
            }
            None => Err(ApiError::Decode(format!(
                "response carried neither text nor error (status {status})"
            ))),
        }
    }

    /// Save the patient form; returns the backend's confirmation message
    pub async fn submit(&self, submission: &Submission) -> Result<String, ApiError> {
        info!("submitting patient form");

        let response = self
            .http
            .post(format!("{}/submit", self.base_url))
            .json(submission)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: SubmitResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{e} (status {status})")))?;

        if let Some(error) = parsed.error {
            warn!(%error, "backend rejected the submission");
            return Err(ApiError::Backend(error));
        }
        Ok(parsed.message.unwrap_or_default())
    }
}
