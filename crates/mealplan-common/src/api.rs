use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::{CachedRecipeDetail, RecipeRequest, WeekPlan, WeekRequest};

pub const PRODUCTION_BASE_URL: &str = "https://mealplanner-is1t.onrender.com";
pub const DEVELOPMENT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Clone, Debug)]
pub struct MealPlanClientConfig {
    pub base_url: String,
    pub default_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl MealPlanClientConfig {
    /// Base URL: `MEALPLAN_API_URL` if set, otherwise the production backend when
    /// `MEALPLAN_ENV=production` and the local development backend in every other case.
    pub fn from_env() -> Self {
        let base_url = std::env::var("MEALPLAN_API_URL").unwrap_or_else(|_| {
            match std::env::var("MEALPLAN_ENV").as_deref() {
                Ok("production") => PRODUCTION_BASE_URL.to_string(),
                _ => DEVELOPMENT_BASE_URL.to_string(),
            }
        });

        // Plan generation runs one model call per day upstream; allow it to take minutes.
        let default_timeout = std::env::var("MEALPLAN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(300));

        let max_retries = std::env::var("MEALPLAN_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);

        let initial_backoff = std::env::var("MEALPLAN_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(200));

        let max_backoff = std::env::var("MEALPLAN_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5_000));

        let max_error_body_bytes = std::env::var("MEALPLAN_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self::new(base_url)
            .with_timeout(default_timeout)
            .with_retries(max_retries, initial_backoff, max_backoff)
            .with_max_error_body_bytes(max_error_body_bytes)
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout: Duration::from_secs(300),
            max_retries: 0,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(5_000),
            max_error_body_bytes: 8 * 1024,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, initial: Duration, max: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_max_error_body_bytes(mut self, bytes: usize) -> Self {
        self.max_error_body_bytes = bytes;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("backend returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("backend returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

impl ApiError {
    /// Transport failures and 429/5xx responses may succeed on a later attempt; a
    /// malformed body or a 4xx will not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::Upstream { status, .. } | ApiError::UpstreamBody { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ApiError::InvalidJson(_) => false,
        }
    }
}

/// The remote plan and recipe generator.
#[async_trait]
pub trait MealPlanApi: Send + Sync {
    async fn get_week(&self, request: &WeekRequest) -> Result<WeekPlan, ApiError>;
    async fn get_recipe(&self, request: &RecipeRequest) -> Result<CachedRecipeDetail, ApiError>;
}

#[derive(Clone)]
pub struct MealPlanClient {
    config: MealPlanClientConfig,
    http: reqwest::Client,
}

impl MealPlanClient {
    pub fn new(config: MealPlanClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent("mealplan-server")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &MealPlanClientConfig {
        &self.config
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.config.base_url);
        self.request_with_retry(|| async {
            let resp = self
                .http
                .post(&url)
                .timeout(self.config.default_timeout)
                .json(body)
                .send()
                .await?;
            Self::parse_json_response(resp, self.config.max_error_body_bytes).await
        })
        .await
    }

    async fn parse_json_response<T: DeserializeOwned>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, ApiError> {
        if resp.status().is_success() {
            // Decode separately so a malformed body is InvalidJson rather than a transport error.
            let bytes = resp.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> ApiError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(&body) {
            let message = match parsed.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            return ApiError::Upstream { status, message };
        }
        ApiError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !e.is_transient() {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "meal plan request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl MealPlanApi for MealPlanClient {
    async fn get_week(&self, request: &WeekRequest) -> Result<WeekPlan, ApiError> {
        info!(
            cuisine = %request.cuisine,
            calories = %request.calories,
            restrictions = request.restrictions.len(),
            "requesting week plan"
        );
        self.post_json("get_week", request).await
    }

    async fn get_recipe(&self, request: &RecipeRequest) -> Result<CachedRecipeDetail, ApiError> {
        self.post_json("get_recipe", request).await
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    let jitter_ms = pseudo_jitter_ms(jitter_cap);
    Duration::from_millis(capped_ms.saturating_add(jitter_ms))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let nanos = now.subsec_nanos() as u64;
    nanos % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(mut b) => {
            if b.len() > max_bytes {
                b.truncate(max_bytes);
            }
            String::from_utf8_lossy(&b).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read backend error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// FastAPI error shape: `{"detail": "..."}`, or a list of validation errors.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    detail: serde_json::Value,
}
