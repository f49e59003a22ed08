//! Client for the licensing service's account-licenses endpoint.
//!
//! Lookups authenticate with the gateway's own service key, never with the
//! caller's credential.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use service_core::observability::TracedRequestExt;
use service_core::retry::{RetryConfig, RetryError, Transient, is_retryable_status, retry_http_call};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

use crate::auth::API_KEY_HEADER;
use crate::config::resolve_under;
use crate::modules::{CORE_MODULE_ID, UNLICENSED_MODULE_ID};

pub const DEFAULT_ENDPOINT_PATH: &str = "/ng/api/licenses/account";

const ACTIVE_STATUS: &str = "ACTIVE";

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("licensing service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("licensing service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid licensing response: {0}")]
    Decode(String),

    #[error("license lookup exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("invalid licensing endpoint: {0}")]
    Endpoint(String),
}

impl Transient for LicenseError {
    fn is_transient(&self) -> bool {
        match self {
            LicenseError::Transport(err) => !err.is_decode() && !err.is_builder(),
            LicenseError::Status { status, .. } => is_retryable_status(*status),
            LicenseError::Decode(_)
            | LicenseError::DeadlineExceeded(_)
            | LicenseError::Endpoint(_) => false,
        }
    }
}

impl From<RetryError<LicenseError>> for LicenseError {
    fn from(err: RetryError<LicenseError>) -> Self {
        match err {
            RetryError::Failed { error, .. } => error,
            RetryError::DeadlineExceeded { deadline, .. } => LicenseError::DeadlineExceeded(deadline),
        }
    }
}

/// Source of authoritative license state.
#[async_trait]
pub trait LicenseLookup: Send + Sync {
    /// Active module ids for `account_id`, always including the baseline ids.
    async fn fetch_licenses(&self, account_id: &str) -> Result<HashSet<String>, LicenseError>;
}

#[derive(Debug, Clone)]
pub struct LicenseClientConfig {
    pub base_url: Url,
    pub endpoint_path: String,
    pub service_api_key: SecretString,
    pub request_timeout: Duration,
    /// Upper bound on a whole lookup, retries and backoff included.
    pub deadline: Duration,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct LicenseEnvelope {
    #[serde(default)]
    data: Option<AccountLicenses>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountLicenses {
    #[serde(default)]
    all_module_licenses: HashMap<String, Vec<ModuleLicense>>,
}

#[derive(Debug, Deserialize)]
struct ModuleLicense {
    #[serde(default)]
    status: Option<String>,
}

/// Module ids with at least one active license record, plus the baseline ids.
fn active_modules(licenses: AccountLicenses) -> HashSet<String> {
    let mut active: HashSet<String> = licenses
        .all_module_licenses
        .into_iter()
        .filter(|(_, records)| {
            records.iter().any(|record| {
                record
                    .status
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(ACTIVE_STATUS))
            })
        })
        .map(|(module, _)| module)
        .collect();

    active.insert(CORE_MODULE_ID.to_string());
    active.insert(UNLICENSED_MODULE_ID.to_string());
    active
}

/// HTTP implementation of [`LicenseLookup`].
///
/// Holds one pooled `reqwest::Client`; construct once at startup and share.
pub struct LicenseClient {
    client: Client,
    endpoint: Url,
    config: LicenseClientConfig,
}

impl LicenseClient {
    pub fn new(config: LicenseClientConfig) -> Result<Self, LicenseError> {
        let endpoint = resolve_under(&config.base_url, &config.endpoint_path)
            .map_err(LicenseError::Endpoint)?;

        let client = Client::builder().timeout(config.request_timeout).build()?;

        tracing::info!(
            endpoint = %endpoint,
            deadline_ms = config.deadline.as_millis() as u64,
            max_retries = config.retry.max_retries,
            "License client initialized"
        );

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn fetch_once(&self, account_id: &str) -> Result<HashSet<String>, LicenseError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("accountIdentifier", account_id)])
            .header(API_KEY_HEADER, self.config.service_api_key.expose_secret())
            .with_trace_context()
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LicenseError::Status { status, body });
        }

        let envelope: LicenseEnvelope = response
            .json()
            .await
            .map_err(|e| LicenseError::Decode(e.to_string()))?;

        let licenses = envelope
            .data
            .ok_or_else(|| LicenseError::Decode("missing data field".to_string()))?;

        Ok(active_modules(licenses))
    }
}

#[async_trait]
impl LicenseLookup for LicenseClient {
    async fn fetch_licenses(&self, account_id: &str) -> Result<HashSet<String>, LicenseError> {
        let modules = retry_http_call(
            &self.config.retry,
            "fetch_account_licenses",
            Some(self.config.deadline),
            || self.fetch_once(account_id),
        )
        .await?;

        tracing::debug!(
            account_id,
            module_count = modules.len(),
            "Fetched account licenses"
        );

        Ok(modules)
    }
}
