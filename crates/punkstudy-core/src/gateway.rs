use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::upload::UploadFile;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_USER_ID: &str = "default_user";
pub const DEFAULT_MAX_LENGTH: u32 = 200;

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_length: u32,
}

/// Backend reply to `/upload`. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadResult(pub Value);

/// Backend reply to `/llm_text`. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationResult(pub Value);

/// Backend reply to `/query`.
///
/// Only `answer` is interpreted; every other field is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryResult(pub Value);

impl QueryResult {
    pub fn answer(text: &str) -> Self {
        Self(serde_json::json!({ "answer": text }))
    }

    /// The `answer` field when it carries something displayable.
    ///
    /// Missing, null, empty, zero, false and structured values all read as absent.
    pub fn answer_text(&self) -> Option<String> {
        match self.0.get("answer")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(number_text(n)),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }
}

/// Integral values print without a fractional part, so `42.0` reads as `42`.
fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        // f64's Display drops a zero fraction
        n.as_f64().map(|f| f.to_string()).unwrap_or_else(|| n.to_string())
    }
}

/// The three remote operations the client depends on.
///
/// Every call is a single request; implementations must not retry on their own.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn upload_document(
        &self,
        file: &UploadFile,
        user_id: &str,
    ) -> Result<UploadResult, TransportError>;

    async fn process_query(
        &self,
        query: &str,
        user_id: &str,
    ) -> Result<QueryResult, TransportError>;

    async fn generate_text(
        &self,
        prompt: &str,
        max_length: u32,
    ) -> Result<GenerationResult, TransportError>;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn upload_document(
        &self,
        file: &UploadFile,
        user_id: &str,
    ) -> Result<UploadResult, TransportError> {
        (**self).upload_document(file, user_id).await
    }

    async fn process_query(
        &self,
        query: &str,
        user_id: &str,
    ) -> Result<QueryResult, TransportError> {
        (**self).process_query(query, user_id).await
    }

    async fn generate_text(
        &self,
        prompt: &str,
        max_length: u32,
    ) -> Result<GenerationResult, TransportError> {
        (**self).generate_text(prompt, max_length).await
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn finish(
        operation: &'static str,
        sent: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Value, TransportError> {
        let response = sent.map_err(|source| {
            warn!(operation, error = %source, "backend request failed");
            TransportError::Request { operation, source }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| {
            warn!(operation, error = %source, "failed reading backend response");
            TransportError::Request { operation, source }
        })?;

        if !status.is_success() {
            warn!(operation, status = status.as_u16(), "backend returned error status");
            return Err(TransportError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        debug!(operation, status = status.as_u16(), bytes = body.len(), "backend responded");
        Ok(decode_body(body))
    }
}

/// Success bodies that are not JSON are kept as a plain string value.
fn decode_body(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

#[async_trait]
impl Backend for GatewayClient {
    async fn upload_document(
        &self,
        file: &UploadFile,
        user_id: &str,
    ) -> Result<UploadResult, TransportError> {
        let url = format!("{}/upload", self.base_url);
        debug!(%url, file = %file.file_name, bytes = file.bytes.len(), "uploading document");

        let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
        let form = Form::new()
            .part("file", part)
            .text("user_id", user_id.to_string());

        let sent = self.client.post(&url).multipart(form).send().await;
        Self::finish("upload", sent).await.map(UploadResult)
    }

    async fn process_query(
        &self,
        query: &str,
        user_id: &str,
    ) -> Result<QueryResult, TransportError> {
        let url = format!("{}/query", self.base_url);
        debug!(%url, chars = query.chars().count(), "submitting query");

        let sent = self
            .client
            .post(&url)
            .json(&QueryRequest { query, user_id })
            .send()
            .await;
        Self::finish("query", sent).await.map(QueryResult)
    }

    async fn generate_text(
        &self,
        prompt: &str,
        max_length: u32,
    ) -> Result<GenerationResult, TransportError> {
        let url = format!("{}/llm_text", self.base_url);
        debug!(%url, max_length, "requesting text generation");

        let sent = self
            .client
            .post(&url)
            .json(&GenerateRequest { prompt, max_length })
            .send()
            .await;
        Self::finish("llm_text", sent).await.map(GenerationResult)
    }
}
