//! Disease classification and crop-care advice endpoints.
//!
//! Both are opaque remote functions: one request, one answer, no retry.

mod advice;

pub use advice::{AdviceAnswer, AdviceEntry, AdviceLog};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::http::api_error_message;
use crate::controller::{MutationHandle, SyncController};
use crate::models::{MutationRequest, NewScan};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

/// Labels a plant image with the detected disease.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_uri: &str) -> Result<String>;
}

/// Answers free-text crop-care questions.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn ask(&self, query: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    image_uri: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(rename = "predictedLabel", alias = "predicted_label", alias = "disease")]
    label: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: Option<String>,
}

/// HTTP client for the predict and chat endpoints.
#[derive(Clone)]
pub struct InferenceClient {
    predict_url: Option<String>,
    chat_url: Option<String>,
    client: Client,
}

impl InferenceClient {
    pub fn new(predict_url: Option<String>, chat_url: Option<String>) -> Result<Self> {
        let predict_url = normalize_endpoint(predict_url, "predict")?;
        let chat_url = normalize_endpoint(chat_url, "chat")?;
        let client = Client::builder()
            .build()
            .map_err(|error| Error::Transport(error.to_string()))?;
        Ok(Self {
            predict_url,
            chat_url,
            client,
        })
    }

    async fn post_json<T, R>(&self, url: &str, body: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|error| Error::Inference(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(api_error_message(status, &body)));
        }
        response
            .json::<R>()
            .await
            .map_err(|error| Error::Inference(format!("unreadable response: {error}")))
    }
}

#[async_trait]
impl Classifier for InferenceClient {
    async fn classify(&self, image_uri: &str) -> Result<String> {
        let url = self
            .predict_url
            .as_deref()
            .ok_or_else(|| Error::Config("predict endpoint is not configured".to_string()))?;
        let image_uri = image_uri.trim();
        if image_uri.is_empty() {
            return Err(Error::Validation("image is required".to_string()));
        }

        let response: PredictResponse = self
            .post_json(url, &PredictRequest { image_uri })
            .await?;
        normalize_text_option(response.label)
            .ok_or_else(|| Error::Inference("no disease detected".to_string()))
    }
}

#[async_trait]
impl Advisor for InferenceClient {
    async fn ask(&self, query: &str) -> Result<String> {
        let url = self
            .chat_url
            .as_deref()
            .ok_or_else(|| Error::Config("chat endpoint is not configured".to_string()))?;
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }

        let response: ChatResponse = self.post_json(url, &ChatRequest { query }).await?;
        normalize_text_option(response.response)
            .ok_or_else(|| Error::Inference("empty answer".to_string()))
    }
}

/// Classify `image_uri`, then record the scan optimistically.
///
/// Nothing is written when classification fails; a scan never carries a
/// made-up label.
pub async fn record_scan(
    scans: &SyncController,
    classifier: &dyn Classifier,
    image_uri: &str,
) -> Result<MutationHandle> {
    let image_uri = image_uri.trim();
    if image_uri.is_empty() {
        return Err(Error::Validation("image is required".to_string()));
    }

    let diagnosis = classifier.classify(image_uri).await?;
    tracing::info!(%diagnosis, "scan classified");
    scans.mutate(MutationRequest::Create(
        NewScan {
            image_uri: image_uri.to_string(),
            diagnosis,
        }
        .into_payload(),
    ))
}

fn normalize_endpoint(url: Option<String>, name: &str) -> Result<Option<String>> {
    match normalize_text_option(url) {
        None => Ok(None),
        Some(url) if is_http_url(&url) => Ok(Some(url)),
        Some(_) => Err(Error::Config(format!(
            "{name} endpoint must include http:// or https://"
        ))),
    }
}
