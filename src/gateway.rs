//! Remote inference gateway
//!
//! One place that talks to external AI providers. Every call is bounded by a
//! timeout, transient failures are retried with linear backoff, and a missing
//! API key degrades to simulated output instead of a hard failure.

use crate::config::GatewayConfig;
use crate::imaging::encode_for_upload;
use crate::models::GarmentCategory;
use crate::prompts::*;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const APP_TITLE: &str = "Aikadin";

// ============ Errors ============

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Client error {status}: {body}")]
    Client { status: u16, body: String },
    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("API key not configured")]
    ConfigurationMissing,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid input: {0}")]
    Input(String),
}

impl GatewayError {
    /// Client faults, bad input and missing configuration are permanent.
    /// Everything else may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_)
                | GatewayError::Network(_)
                | GatewayError::Server { .. }
                | GatewayError::InvalidResponse(_)
        )
    }

    fn from_status(status: u16, body: String) -> Self {
        if (400..500).contains(&status) {
            GatewayError::Client { status, body }
        } else {
            GatewayError::Server { status, body }
        }
    }
}

// ============ Timeout & Retry ============

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Runs `fut` with a hard deadline. On expiry the future is dropped, which
/// aborts any in-flight transport it owns.
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    }
}

/// Retries `request_fn` up to `policy.max_retries` times, sleeping
/// `attempt * base_delay` between attempts. Non-retryable errors are returned
/// immediately; after the last attempt the last error is returned.
pub async fn retry_request<T, F, Fut>(policy: RetryPolicy, mut request_fn: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_retries = policy.max_retries.max(1);
    let mut last_error = GatewayError::Network("no attempt made".to_string());

    for attempt in 1..=max_retries {
        match request_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < max_retries {
                    let delay = policy.base_delay * attempt;
                    warn!(
                        "[retry_request] {} - retrying in {}ms (attempt {}/{})",
                        e,
                        delay.as_millis(),
                        attempt,
                        max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }

    error!("[retry_request] giving up after {} attempts: {}", max_retries, last_error);
    Err(last_error)
}

// ============ Requests ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ChatCompletion,
    ImageAnalysis,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        // Both go through the chat-completions API; image analysis carries
        // image_url parts in the user message.
        match self {
            Endpoint::ChatCompletion | Endpoint::ImageAnalysis => "/chat/completions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub endpoint: Endpoint,
    pub payload: Value,
    /// Overrides the endpoint's configured timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub status: u16,
    pub body: Value,
}

impl InferenceResponse {
    /// `choices[0].message.content`, if present and non-empty
    pub fn first_content(&self) -> Option<&str> {
        self.body["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Light,
    Heavy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub model: String,
    /// True when no provider was called and the text is canned
    pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayHealth {
    pub configured: bool,
    pub base_url: String,
}

// ============ Gateway ============

pub struct Gateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key().is_some()
    }

    pub fn health_check(&self) -> GatewayHealth {
        GatewayHealth {
            configured: self.is_configured(),
            base_url: self.config.base_url.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: self.config.retry_base_delay(),
        }
    }

    /// Heavy model when the text mentions any complexity keyword
    pub fn select_model(&self, text: &str) -> ModelTier {
        let lowered = text.to_lowercase();
        let complex = self
            .config
            .complexity_keywords
            .iter()
            .any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()));
        if complex {
            ModelTier::Heavy
        } else {
            ModelTier::Light
        }
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Light => &self.config.light_model,
            ModelTier::Heavy => &self.config.heavy_model,
        }
    }

    fn default_timeout(&self, endpoint: Endpoint) -> Duration {
        match endpoint {
            Endpoint::ChatCompletion => self.config.chat_timeout(),
            Endpoint::ImageAnalysis => self.config.image_timeout(),
        }
    }

    /// Sends one request to the provider, bounded by the request's timeout.
    /// No retries; see `invoke_with_retry`.
    pub async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse, GatewayError> {
        let api_key = self
            .config
            .api_key()
            .ok_or(GatewayError::ConfigurationMissing)?;
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.default_timeout(request.endpoint));
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            request.endpoint.path()
        );

        with_timeout(timeout, async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .header("X-Title", APP_TITLE)
                .header("Content-Type", "application/json")
                .json(&request.payload)
                .send()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| GatewayError::Network(format!("Failed to read response: {}", e)))?;

            if !(200..300).contains(&status) {
                error!("[invoke] {} returned {}: {}", url, status, body);
                return Err(GatewayError::from_status(status, body));
            }

            let body: Value = serde_json::from_str(&body)
                .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

            Ok(InferenceResponse { status, body })
        })
        .await
    }

    pub async fn invoke_with_retry(
        &self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, GatewayError> {
        retry_request(self.retry_policy(), || self.invoke(request)).await
    }

    /// Chat completion. Without an API key a labelled simulated reply is
    /// returned after a short delay.
    pub async fn complete_chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, GatewayError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let model = self.model_for(self.select_model(last_user)).to_string();

        if !self.is_configured() {
            warn!("[complete_chat] API key not configured, using simulated reply");
            return Ok(self.simulated_reply(messages, model).await);
        }

        info!(
            "[complete_chat] Sending {} messages to model {}",
            messages.len(),
            model
        );

        let request = InferenceRequest {
            endpoint: Endpoint::ChatCompletion,
            payload: json!({
                "model": model,
                "messages": messages,
                "max_tokens": self.config.max_tokens,
                "temperature": self.config.temperature,
                "presence_penalty": self.config.presence_penalty,
                "frequency_penalty": self.config.frequency_penalty,
                "stop": self.config.stop_sequences,
            }),
            timeout: None,
        };

        let response = self.invoke_with_retry(&request).await?;
        let text = response.first_content().unwrap_or(NO_REPLY_TEXT).to_string();

        Ok(ChatReply {
            text,
            model,
            simulated: false,
        })
    }

    async fn simulated_reply(&self, messages: &[ChatTurn], model: String) -> ChatReply {
        tokio::time::sleep(Duration::from_millis(self.config.simulated_delay_ms)).await;
        let canned = SIMULATED_REPLIES[messages.len() % SIMULATED_REPLIES.len()];
        ChatReply {
            text: format!("{} {}", SIMULATED_LABEL, canned),
            model,
            simulated: true,
        }
    }

    /// Image-based style analysis of a person photo and a garment photo.
    /// Returns `ConfigurationMissing` when no key is set so callers can fall
    /// back locally.
    pub async fn analyze_style(
        &self,
        person_image: &Path,
        garment_image: &Path,
        category: GarmentCategory,
    ) -> Result<String, GatewayError> {
        if !self.is_configured() {
            warn!("[analyze_style] API key not configured");
            return Err(GatewayError::ConfigurationMissing);
        }

        let person_url = encode_for_upload(person_image)
            .await
            .map_err(GatewayError::Input)?;
        let garment_url = encode_for_upload(garment_image)
            .await
            .map_err(GatewayError::Input)?;

        let request = InferenceRequest {
            endpoint: Endpoint::ImageAnalysis,
            payload: json!({
                "model": self.model_for(ModelTier::Heavy),
                "messages": [
                    { "role": "system", "content": STYLE_ANALYST_PROMPT },
                    {
                        "role": "user",
                        "content": [
                            {
                                "type": "text",
                                "text": STYLE_ANALYSIS_REQUEST.replace("{region}", category.region_hint())
                            },
                            { "type": "image_url", "image_url": { "url": person_url } },
                            { "type": "image_url", "image_url": { "url": garment_url } }
                        ]
                    }
                ],
                "max_tokens": self.config.max_tokens,
                "temperature": self.config.temperature,
            }),
            timeout: None,
        };

        info!(
            "[analyze_style] Requesting analysis for {} ({})",
            garment_image.display(),
            category.as_str()
        );
        let response = self.invoke_with_retry(&request).await?;
        Ok(response
            .first_content()
            .unwrap_or(NO_ANALYSIS_TEXT)
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = retry_request(fast_policy(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(GatewayError::Server {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = retry_request(fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(GatewayError::Client {
                    status: 400,
                    body: "bad request".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(GatewayError::Client { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_surfaces_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = retry_request(fast_policy(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(GatewayError::Network(format!("attempt {}", attempt))) }
        })
        .await;

        assert_eq!(result, Err(GatewayError::Network("attempt 3".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_returns_control_early() {
        let started = Instant::now();

        let result = with_timeout(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, GatewayError>("late")
        })
        .await;

        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_millis(100))));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_model_selection_is_keyword_based() {
        let gateway = Gateway::new(GatewayConfig::default());
        assert_eq!(
            gateway.select_model("Düğün için KOMBIN ÖNERISI lazım"),
            ModelTier::Heavy
        );
        assert_eq!(gateway.select_model("Need an outfit for a wedding"), ModelTier::Heavy);
        assert_eq!(gateway.select_model("hello"), ModelTier::Light);
        assert_eq!(gateway.model_for(ModelTier::Heavy), "gpt-4o");
    }

    #[test]
    fn test_error_classification() {
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GatewayError::from_status(502, String::new()).is_retryable());
        assert!(!GatewayError::from_status(404, String::new()).is_retryable());
        assert!(!GatewayError::ConfigurationMissing.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_key_degrades_to_simulated_reply() {
        let config = GatewayConfig {
            simulated_delay_ms: 0,
            ..Default::default()
        };
        let gateway = Gateway::new(config);
        let reply = gateway
            .complete_chat(&[ChatTurn::new(ChatRole::User, "hi")])
            .await
            .unwrap();
        assert!(reply.simulated);
        assert!(reply.text.starts_with(SIMULATED_LABEL));
        assert!(!gateway.health_check().configured);
    }

    #[tokio::test]
    async fn test_missing_key_fails_style_analysis() {
        let gateway = Gateway::new(GatewayConfig::default());
        let result = gateway
            .analyze_style(Path::new("a.jpg"), Path::new("b.jpg"), GarmentCategory::Dresses)
            .await;
        assert_eq!(result, Err(GatewayError::ConfigurationMissing));
    }
}
