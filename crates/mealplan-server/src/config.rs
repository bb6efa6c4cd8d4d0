use std::path::PathBuf;

use mealplan_common::api::MealPlanClientConfig;
use mealplan_common::preferences::ResetPolicy;

use crate::error::AppError;

const DEFAULT_CACHE_PATH: &str = "mealplan-cache.json";

/// Where recipe details are cached between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    File(PathBuf),
    Redis(String),
}

/// Application configuration loaded explicitly from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: MealPlanClientConfig,
    pub cache: CacheBackend,
    pub reset_policy: ResetPolicy,
    /// Serve MCP over TCP on this address instead of stdio.
    pub tcp_listen_addr: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `MEALPLAN_API_URL`, `MEALPLAN_ENV` and the client tuning variables (see
    ///   [`MealPlanClientConfig::from_env`])
    /// - `MEALPLAN_CACHE_BACKEND`: `file` (default), `memory` or `redis`
    /// - `MEALPLAN_CACHE_PATH`: cache file for the `file` backend (default: "mealplan-cache.json")
    /// - `REDIS_URL`: required when the backend is `redis`
    /// - `MEALPLAN_RESET_POLICY`: `on-success` (default) or `always`
    /// - `MCP_TCP_LISTEN_ADDR`: e.g. "127.0.0.1:7010"
    pub fn from_env() -> Result<Self, AppError> {
        let api = MealPlanClientConfig::from_env();
        Self::from_vars(api, |name| std::env::var(name).ok())
    }

    fn from_vars(
        api: MealPlanClientConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        let cache = match var("MEALPLAN_CACHE_BACKEND").as_deref() {
            None | Some("file") => CacheBackend::File(PathBuf::from(
                var("MEALPLAN_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string()),
            )),
            Some("memory") => CacheBackend::Memory,
            Some("redis") => {
                let url = var("REDIS_URL").ok_or_else(|| {
                    AppError::Config(
                        "REDIS_URL environment variable is required for the redis cache backend"
                            .to_string(),
                    )
                })?;
                CacheBackend::Redis(url)
            }
            Some(other) => {
                return Err(AppError::Config(format!(
                    "unknown MEALPLAN_CACHE_BACKEND: {other} (expected file, memory or redis)"
                )));
            }
        };

        let reset_policy = match var("MEALPLAN_RESET_POLICY") {
            Some(raw) => raw.parse::<ResetPolicy>().map_err(AppError::Config)?,
            None => ResetPolicy::default(),
        };

        Ok(Self {
            api,
            cache,
            reset_policy,
            tcp_listen_addr: var("MCP_TCP_LISTEN_ADDR"),
        })
    }
}
