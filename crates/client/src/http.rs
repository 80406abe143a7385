//! HTTP transport backed by reqwest.

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::metrics::{increment_failure_count, increment_retry_count, RequestTimer};
use crate::transport::{ApiRequest, ApiResponse, HttpMethod, Transport};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_KEYS_HEADER: &str = "X-ApiKeys";
const MAX_RETRY_AFTER_SECS: u64 = 90;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff: Duration,
}

impl HttpTransport {
    /// Build a transport from validated configuration.
    ///
    /// # Errors
    /// Returns `ApiError::Config` if the configuration is incomplete or the
    /// keys cannot be carried in a header.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;

        let access_key = config.access_key.as_deref().unwrap_or_default();
        let secret_key = config.secret_key.as_deref().unwrap_or_default();

        let mut keys = HeaderValue::from_str(&format!(
            "accessKey={};secretKey={}",
            access_key, secret_key
        ))
        .map_err(|e| ApiError::Config(format!("API keys are not valid header text: {}", e)))?;
        keys.set_sensitive(true);

        let user_agent = HeaderValue::from_str(&config.user_agent())
            .map_err(|e| ApiError::Config(format!("Invalid user agent: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(API_KEYS_HEADER, keys);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, user_agent);

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!("http transport ready for {}", config.url);

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            backoff: config.backoff(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn retry_delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        if let Some(seconds) = retry_after {
            return Duration::from_secs(seconds.min(MAX_RETRY_AFTER_SECS));
        }
        self.backoff
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
    ) -> Result<(ApiResponse, Option<u64>), reqwest::Error> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        };

        let mut builder = self.client.request(method, self.url_for(&request.path));
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            // Gateways sometimes answer with HTML or plain text.
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };

        Ok((ApiResponse::new(status, body), retry_after))
    }
}

/// 429 and 503 mean the request was turned away unprocessed, so any method
/// may repeat it. Other gateway failures may follow a completed write.
fn is_retryable_status(method: HttpMethod, status: u16) -> bool {
    match status {
        429 | 503 => true,
        500 | 502 | 504 => method.is_idempotent(),
        _ => false,
    }
}

/// A refused connection never reached the server; a timeout might have.
fn is_retryable_failure(method: HttpMethod, connect: bool, timeout: bool) -> bool {
    connect || (timeout && method.is_idempotent())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let _timer = RequestTimer::new();

        let mut attempt = 0;
        loop {
            debug!(
                "{} {} (attempt {}/{})",
                request.method,
                request.path,
                attempt + 1,
                self.max_retries + 1
            );

            let (delay, reason) = match self.send_once(&request).await {
                Ok((response, retry_after)) => {
                    if !is_retryable_status(request.method, response.status)
                        || attempt >= self.max_retries
                    {
                        if !response.is_success() {
                            increment_failure_count();
                        }
                        return Ok(response);
                    }
                    (
                        self.retry_delay(attempt, retry_after),
                        format!("HTTP {}", response.status),
                    )
                }
                Err(e) => {
                    if !is_retryable_failure(request.method, e.is_connect(), e.is_timeout())
                        || attempt >= self.max_retries
                    {
                        increment_failure_count();
                        return Err(ApiError::Transport(format!(
                            "{} {} failed: {}",
                            request.method, request.path, e
                        )));
                    }
                    (self.retry_delay(attempt, None), e.to_string())
                }
            };

            warn!(
                "{} {} failed (attempt {}): {}; retrying in {:?}",
                request.method,
                request.path,
                attempt + 1,
                reason,
                delay
            );
            increment_retry_count();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
