//! Gate configuration.
//!
//! Defaults, then an optional JSON file, then `KIDGATE_*` environment
//! overrides. Credentials are resolved in [`GateConfig::connect`], so a
//! missing key fails when the client is built rather than mid-interaction.

use crate::api::{
    ApiStyle, ChatBackend, OpenAiClient, ResponsesClient, RetryConfig, resolve_api_key,
};
use crate::gate::BlockPolicy;
use crate::{
    API_KEY_ENV, DEFAULT_MAX_CHARS, DEFAULT_MODEL, GateError, GateResult, JUDGE_TEMPERATURE,
    OPENAI_BASE_URL,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    /// Generator model. Default: `"gpt-5.2-chat-latest"`.
    pub model: String,
    /// Screening and validation judge model. Default: same as `model`.
    pub judge_model: String,
    /// Advisory character budget for composed replies. Default: `600`.
    pub max_chars: usize,
    /// Judge sampling temperature. Default: `0.3`.
    pub judge_temperature: f32,
    /// OpenAI-compatible base URL.
    pub base_url: String,
    /// Environment variable holding the API key. Default: `"OPENAI_API_KEY"`.
    pub api_key_env: String,
    /// Outbound request timeout in seconds. Default: `120`.
    pub timeout_secs: u64,
    pub api_style: ApiStyle,
    pub block_policy: BlockPolicy,
    /// Directory for JSON Lines audit files. `None` keeps records in memory.
    pub audit_dir: Option<PathBuf>,
    /// Caller-side retries of transient upstream errors. Default: `0`.
    pub retries: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            judge_model: DEFAULT_MODEL.to_string(),
            max_chars: DEFAULT_MAX_CHARS,
            judge_temperature: JUDGE_TEMPERATURE,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key_env: API_KEY_ENV.to_string(),
            timeout_secs: 120,
            api_style: ApiStyle::default(),
            block_policy: BlockPolicy::default(),
            audit_dir: None,
            retries: 0,
        }
    }
}

impl GateConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GateError::Configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            GateError::Configuration(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Apply `KIDGATE_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> GateResult<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup. Blank values are ignored.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> GateResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("KIDGATE_MODEL") {
            self.model = model;
        }
        if let Some(judge) = get("KIDGATE_JUDGE_MODEL") {
            self.judge_model = judge;
        }
        if let Some(url) = get("KIDGATE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(style) = get("KIDGATE_API_STYLE") {
            self.api_style = style.parse()?;
        }
        if let Some(policy) = get("KIDGATE_BLOCK_POLICY") {
            self.block_policy = policy.parse()?;
        }
        if let Some(dir) = get("KIDGATE_AUDIT_DIR") {
            self.audit_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_style(mut self, style: ApiStyle) -> Self {
        self.api_style = style;
        self
    }

    pub fn with_block_policy(mut self, policy: BlockPolicy) -> Self {
        self.block_policy = policy;
        self
    }

    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_retries(self.retries)
    }

    /// Build the configured provider client.
    ///
    /// `api_key` wins over the configured environment variable. No key at
    /// all is a [`GateError::Configuration`].
    pub fn connect(&self, api_key: Option<&str>) -> GateResult<Arc<dyn ChatBackend>> {
        let key = resolve_api_key(api_key, &self.api_key_env)?;
        debug!(style = %self.api_style, base_url = %self.base_url, "Building model client");
        let backend: Arc<dyn ChatBackend> = match self.api_style {
            ApiStyle::Chat => Arc::new(OpenAiClient::with_base_url(
                key,
                self.base_url.as_str(),
                self.timeout(),
            )?),
            ApiStyle::Responses => Arc::new(ResponsesClient::with_base_url(
                key,
                self.base_url.as_str(),
                self.timeout(),
            )?),
        };
        Ok(backend)
    }
}
