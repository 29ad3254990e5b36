//! Vision provider adapters.
//!
//! One [`HttpVisionProvider`] speaks three wire dialects, selected by the
//! endpoint's [`ProviderKind`]. Each call carries the system instruction,
//! the user instruction and one page image, and expects a single text
//! completion back. Failures leave this module already classified as a
//! [`ProviderError`]; the cascade never sees an HTTP status or a JSON body.

use crate::config::{Credential, ProviderEndpoint, ProviderKind};
use crate::error::{ErrorKind, ExtractError, ProviderError};
use crate::pipeline::classify::{classify_content, classify_status, classify_transport};
use crate::pipeline::encode::PageImage;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Error bodies are truncated to this many characters in `ProviderError`.
const MAX_DETAIL_CHARS: usize = 300;

/// Everything a provider needs to transcribe one page.
#[derive(Debug, Clone)]
pub struct OcrRequest {
    pub system: String,
    pub user: String,
    pub image: PageImage,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A vision-capable text-recognition service.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Stable provider identifier, used to scope burned credentials.
    fn id(&self) -> &str;

    /// Transcribe the request's image with `model` under `credential`.
    ///
    /// `Ok` text is non-empty and not a refusal.
    async fn recognize(
        &self,
        model: &str,
        credential: &Credential,
        request: &OcrRequest,
    ) -> Result<String, ProviderError>;
}

/// Build the shared HTTP client with the per-call timeout.
pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client, ExtractError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("bidtext/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))
}

/// [`VisionProvider`] over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpVisionProvider {
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl HttpVisionProvider {
    pub fn new(endpoint: ProviderEndpoint, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }

    fn error(&self, kind: ErrorKind, model: &str, detail: impl Into<String>) -> ProviderError {
        ProviderError::new(kind, &self.endpoint.id, model, detail)
    }
}

#[async_trait]
impl VisionProvider for HttpVisionProvider {
    fn id(&self) -> &str {
        &self.endpoint.id
    }

    async fn recognize(
        &self,
        model: &str,
        credential: &Credential,
        request: &OcrRequest,
    ) -> Result<String, ProviderError> {
        let kind = self.endpoint.kind;
        let url = request_url(kind, self.endpoint.base_url(), model);
        let body = request_body(kind, model, request);

        let builder = self.client.post(&url).json(&body);
        let builder = match kind {
            ProviderKind::OpenAiCompatible => builder.bearer_auth(credential.secret()),
            ProviderKind::Anthropic => builder
                .header("x-api-key", credential.secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Gemini => builder.header("x-goog-api-key", credential.secret()),
        };

        debug!(provider = %self.endpoint.id, model, credential = %credential.label, "OCR request");

        let response = builder
            .send()
            .await
            .map_err(|e| self.error(classify_transport(&e), model, e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| self.error(classify_transport(&e), model, e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(self
                .error(classify_status(status, &text), model, truncate(&text))
                .with_status(status));
        }

        let content = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| response_text(kind, &v));
        classify_content(content.as_deref()).map_err(|k| {
            self.error(k, model, format!("unusable completion: {}", truncate(&text)))
                .with_status(status)
        })
    }
}

/// Endpoint URL for one call.
pub fn request_url(kind: ProviderKind, base: &str, model: &str) -> String {
    match kind {
        ProviderKind::OpenAiCompatible => format!("{base}/chat/completions"),
        ProviderKind::Anthropic => format!("{base}/v1/messages"),
        ProviderKind::Gemini => format!("{base}/v1beta/models/{model}:generateContent"),
    }
}

/// JSON request body for one call.
pub fn request_body(kind: ProviderKind, model: &str, req: &OcrRequest) -> Value {
    match kind {
        ProviderKind::OpenAiCompatible => json!({
            "model": model,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": [
                    { "type": "text", "text": req.user },
                    { "type": "image_url", "image_url": {
                        "url": req.image.data_url(),
                        "detail": "high"
                    } }
                ] }
            ]
        }),
        ProviderKind::Anthropic => json!({
            "model": model,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "system": req.system,
            "messages": [
                { "role": "user", "content": [
                    { "type": "image", "source": {
                        "type": "base64",
                        "media_type": req.image.mime_type,
                        "data": req.image.base64
                    } },
                    { "type": "text", "text": req.user }
                ] }
            ]
        }),
        ProviderKind::Gemini => json!({
            "systemInstruction": { "parts": [ { "text": req.system } ] },
            "contents": [
                { "role": "user", "parts": [
                    { "inlineData": {
                        "mimeType": req.image.mime_type,
                        "data": req.image.base64
                    } },
                    { "text": req.user }
                ] }
            ],
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens
            }
        }),
    }
}

/// Pull the completion text out of a 2xx body.
///
/// Returns `None` for unexpected shapes and for responses the provider
/// marked as filtered or refused.
pub fn response_text(kind: ProviderKind, body: &Value) -> Option<String> {
    match kind {
        ProviderKind::OpenAiCompatible => {
            let choice = body.get("choices")?.get(0)?;
            if choice.get("finish_reason").and_then(Value::as_str) == Some("content_filter") {
                return None;
            }
            let message = choice.get("message")?;
            if message.get("refusal").is_some_and(|r| !r.is_null()) {
                return None;
            }
            match message.get("content")? {
                Value::String(s) => Some(s.clone()),
                // Some compatible servers return content parts.
                Value::Array(parts) => Some(join_text_parts(parts, "text")),
                _ => None,
            }
        }
        ProviderKind::Anthropic => {
            if body.get("stop_reason").and_then(Value::as_str) == Some("refusal") {
                return None;
            }
            let blocks = body.get("content")?.as_array()?;
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            Some(text.join(""))
        }
        ProviderKind::Gemini => {
            if body.pointer("/promptFeedback/blockReason").is_some() {
                return None;
            }
            let candidate = body.get("candidates")?.get(0)?;
            let finish = candidate.get("finishReason").and_then(Value::as_str);
            if matches!(finish, Some("SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST")) {
                return None;
            }
            let parts = candidate.pointer("/content/parts")?.as_array()?;
            Some(join_text_parts(parts, "text"))
        }
    }
}

fn join_text_parts(parts: &[Value], key: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.get(key).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

fn truncate(s: &str) -> String {
    let mut out: String = s.chars().take(MAX_DETAIL_CHARS).collect();
    if s.chars().count() > MAX_DETAIL_CHARS {
        out.push('…');
    }
    out
}
