//! Gateway configuration.
//!
//! Loaded through [`service_core::config::layered`], so every key can be set
//! from the environment, e.g. `APP_PLATFORM__BASE_URL` or
//! `APP_LICENSE__CACHE_TTL_SECS`.

use config::{ConfigBuilder, builder::DefaultState};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use service_core::config::{self as core_config, non_empty};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::time::Duration;

use crate::license::{DEFAULT_ENDPOINT_PATH, LicenseClientConfig};
use crate::middleware::DEFAULT_MAX_BODY_BYTES;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub server: core_config::Config,
    pub platform: PlatformConfig,
    pub license: LicenseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub base_url: String,
    /// Gateway's own credential, used only for license lookups.
    pub service_api_key: SecretString,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseConfig {
    pub cache_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub lookup_deadline_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub endpoint_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Acts as the caller for requests that carry no credentials.
    pub fallback_api_key: Option<SecretString>,
    pub default_org_id: Option<String>,
    pub default_project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    pub path: String,
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_builder(core_config::layered())
    }

    /// Apply defaults to `builder`, then deserialize and validate.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let config: GatewayConfig = builder
            .set_default("server.port", 8080)?
            .set_default("server.log_level", "info")?
            .set_default("platform.request_timeout_ms", 10_000)?
            .set_default("license.cache_ttl_secs", 300)?
            .set_default("license.sweep_interval_secs", 60)?
            .set_default("license.lookup_deadline_ms", 5_000)?
            .set_default("license.max_retries", 3)?
            .set_default("license.initial_backoff_ms", 100)?
            .set_default("license.max_backoff_ms", 2_000)?
            .set_default("license.endpoint_path", DEFAULT_ENDPOINT_PATH)?
            .set_default("mcp.path", "/mcp")?
            .set_default("mcp.max_body_bytes", DEFAULT_MAX_BODY_BYTES as i64)?
            .build()?
            .try_deserialize()?;

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    fn normalized(mut self) -> Self {
        self.server.otlp_endpoint = non_empty(self.server.otlp_endpoint);
        self.auth.default_org_id = non_empty(self.auth.default_org_id);
        self.auth.default_project_id = non_empty(self.auth.default_project_id);
        self.auth.fallback_api_key = self
            .auth
            .fallback_api_key
            .filter(|key| !key.expose_secret().trim().is_empty());
        self
    }

    fn validate(&self) -> Result<(), AppError> {
        self.platform_url()?;

        if self.platform.service_api_key.expose_secret().trim().is_empty() {
            return Err(config_error("platform.service_api_key must not be empty"));
        }

        if self.license.cache_ttl_secs == 0 {
            return Err(config_error("license.cache_ttl_secs must be greater than 0"));
        }

        if self.license.sweep_interval_secs == 0 {
            return Err(config_error("license.sweep_interval_secs must be greater than 0"));
        }

        if self.license.lookup_deadline_ms == 0 {
            return Err(config_error("license.lookup_deadline_ms must be greater than 0"));
        }

        if !self.mcp.path.starts_with('/') {
            return Err(config_error("mcp.path must start with '/'"));
        }

        if self.mcp.max_body_bytes == 0 {
            return Err(config_error("mcp.max_body_bytes must be greater than 0"));
        }

        Ok(())
    }

    /// Platform base URL; must be absolute http(s).
    pub fn platform_url(&self) -> Result<Url, AppError> {
        let url = Url::parse(&self.platform.base_url).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("platform.base_url is invalid: {}", e))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "platform.base_url must use http or https, got '{}'",
                other
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.platform.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.license.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.license.sweep_interval_secs)
    }

    pub fn license_client_config(&self) -> Result<LicenseClientConfig, AppError> {
        Ok(LicenseClientConfig {
            base_url: self.platform_url()?,
            endpoint_path: self.license.endpoint_path.clone(),
            service_api_key: self.platform.service_api_key.clone(),
            request_timeout: self.request_timeout(),
            deadline: Duration::from_millis(self.license.lookup_deadline_ms),
            retry: RetryConfig {
                max_retries: self.license.max_retries,
                initial_backoff: Duration::from_millis(self.license.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.license.max_backoff_ms),
                ..RetryConfig::default()
            },
        })
    }
}

/// Resolve `path` beneath `base`, keeping any path prefix `base` carries.
///
/// `Url::join` with an absolute path would replace that prefix.
pub fn resolve_under(base: &Url, path: &str) -> Result<Url, String> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefix = format!("{}/", base.path());
        base.set_path(&prefix);
    }
    base.join(&format!("./{}", path.trim_start_matches('/')))
        .map_err(|e| e.to_string())
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("{}", message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConfigBuilder<DefaultState> {
        config::Config::builder()
            .set_override("platform.base_url", "https://platform.example.com")
            .unwrap()
            .set_override("platform.service_api_key", "sat.gateway.tok.secret")
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_builder(builder()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.license.endpoint_path, DEFAULT_ENDPOINT_PATH);
        assert_eq!(config.mcp.path, "/mcp");
        assert_eq!(config.mcp.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(config.auth.fallback_api_key.is_none());

        let client = config.license_client_config().unwrap();
        assert_eq!(client.deadline, Duration::from_millis(5_000));
        assert_eq!(client.retry.max_retries, 3);
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = GatewayConfig::from_builder(
            builder()
                .set_override("license.cache_ttl_secs", 30)
                .unwrap()
                .set_override("auth.default_org_id", "  ")
                .unwrap()
                .set_override("auth.default_project_id", "proj")
                .unwrap()
                .set_override("auth.fallback_api_key", "")
                .unwrap(),
        )
        .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.auth.default_org_id, None);
        assert_eq!(config.auth.default_project_id.as_deref(), Some("proj"));
        assert!(config.auth.fallback_api_key.is_none());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = GatewayConfig::from_builder(
            builder()
                .set_override("platform.base_url", "ftp://platform.example.com")
                .unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = GatewayConfig::from_builder(
            builder().set_override("platform.base_url", "not a url").unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let err = GatewayConfig::from_builder(
            builder().set_override("license.cache_ttl_secs", 0).unwrap(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("cache_ttl_secs"));
    }

    #[test]
    fn test_missing_platform_is_an_error() {
        assert!(GatewayConfig::from_builder(config::Config::builder()).is_err());
    }

    #[test]
    fn test_resolve_under_keeps_base_path() {
        let prefixed = Url::parse("https://app.example.io/gateway").unwrap();
        assert_eq!(
            resolve_under(&prefixed, DEFAULT_ENDPOINT_PATH).unwrap().as_str(),
            "https://app.example.io/gateway/ng/api/licenses/account"
        );

        let trailing = Url::parse("https://app.example.io/gateway/").unwrap();
        assert_eq!(
            resolve_under(&trailing, "pipeline/api/pipelines").unwrap().as_str(),
            "https://app.example.io/gateway/pipeline/api/pipelines"
        );

        let bare = Url::parse("https://app.example.io").unwrap();
        assert_eq!(
            resolve_under(&bare, DEFAULT_ENDPOINT_PATH).unwrap().as_str(),
            "https://app.example.io/ng/api/licenses/account"
        );
    }

    #[test]
    fn test_prefixed_platform_url_reaches_license_endpoint() {
        let config = GatewayConfig::from_builder(
            builder()
                .set_override("platform.base_url", "https://app.example.io/gateway")
                .unwrap(),
        )
        .unwrap();

        let client = config.license_client_config().unwrap();
        let endpoint = resolve_under(&client.base_url, &client.endpoint_path).unwrap();
        assert_eq!(endpoint.path(), "/gateway/ng/api/licenses/account");
    }
}
