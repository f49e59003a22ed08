//! Derives the caller's account and forwardable credential from request headers.
//!
//! Three sources are tried in order:
//! 1. `Authorization: <scheme> <jwt>` for a known scheme, paired with the
//!    `x-account-id` companion header. Only the JWT envelope is checked here;
//!    the signature is verified by whichever platform service receives the
//!    forwarded credential.
//! 2. `x-api-key: prefix.ACCOUNT_ID.TOKEN_ID.secret`.
//! 3. A statically configured fallback API key.

use axum::http::{HeaderMap, HeaderName, header};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Companion header carrying the account id alongside a bearer token.
pub const ACCOUNT_HEADER: &str = "x-account-id";
pub const API_KEY_HEADER: &str = "x-api-key";

const BEARER_SCHEMES: &[&str] = &["Bearer ", "IdentityService "];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    Missing,

    #[error("malformed credentials: {0}")]
    Malformed(String),
}

/// Credential as supplied by the caller, forwarded verbatim downstream.
///
/// Request extensions hold exactly one of these per authenticated request;
/// tool handlers read it from there instead of re-parsing headers.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    /// Full `Authorization` header value, scheme included.
    Bearer { raw_header: String },
    /// Per-request API key.
    ApiKey { raw_key: String },
    /// Operator-configured key used when the request carried no credential.
    FallbackApiKey { raw_key: String },
}

impl AuthMaterial {
    /// Label used in logs and metrics.
    pub fn source(&self) -> &'static str {
        match self {
            AuthMaterial::Bearer { .. } => "bearer",
            AuthMaterial::ApiKey { .. } => "api_key",
            AuthMaterial::FallbackApiKey { .. } => "fallback",
        }
    }

    /// Header name and value to send when forwarding this credential.
    pub fn forward_header(&self) -> (HeaderName, &str) {
        match self {
            AuthMaterial::Bearer { raw_header } => (header::AUTHORIZATION, raw_header),
            AuthMaterial::ApiKey { raw_key } | AuthMaterial::FallbackApiKey { raw_key } => {
                (HeaderName::from_static(API_KEY_HEADER), raw_key)
            }
        }
    }
}

impl std::fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthMaterial::{}([REDACTED])", self.source())
    }
}

/// Successful extraction result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub account_id: String,
    pub material: AuthMaterial,
}

#[derive(Debug, Clone, Default)]
pub struct AuthExtractor {
    fallback: Option<Authenticated>,
}

impl AuthExtractor {
    /// Build an extractor. A configured fallback key must itself be well formed.
    pub fn new(fallback_api_key: Option<&SecretString>) -> Result<Self, AuthError> {
        let fallback = match fallback_api_key {
            Some(key) => {
                let raw_key = key.expose_secret().to_string();
                let account_id = account_from_api_key(raw_key.trim())?;
                tracing::warn!(
                    account_id = %account_id,
                    auth_source = "fallback",
                    "Static fallback API key configured; unauthenticated requests will act as this account"
                );
                Some(Authenticated {
                    account_id,
                    material: AuthMaterial::FallbackApiKey { raw_key },
                })
            }
            None => None,
        };

        Ok(Self { fallback })
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn extract(&self, headers: &HeaderMap) -> Result<Authenticated, AuthError> {
        if let Some(token) = bearer_token(headers)? {
            let raw_header = header_str(headers, header::AUTHORIZATION.as_str())?
                .unwrap_or_default()
                .to_string();
            return extract_bearer(token, raw_header, headers);
        }

        if let Some(raw_key) = header_str(headers, API_KEY_HEADER)? {
            let account_id = account_from_api_key(raw_key.trim())?;
            return Ok(Authenticated {
                account_id,
                material: AuthMaterial::ApiKey {
                    raw_key: raw_key.to_string(),
                },
            });
        }

        match &self.fallback {
            Some(fallback) => {
                tracing::debug!(
                    account_id = %fallback.account_id,
                    auth_source = "fallback",
                    "No request credentials, using static fallback API key"
                );
                Ok(fallback.clone())
            }
            None => Err(AuthError::Missing),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AuthError> {
    match headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| AuthError::Malformed(format!("{} header is not valid ASCII", name))),
        None => Ok(None),
    }
}

/// Token part of an `Authorization` header with a known scheme, if any.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = header_str(headers, header::AUTHORIZATION.as_str())? else {
        return Ok(None);
    };

    Ok(BEARER_SCHEMES
        .iter()
        .find_map(|scheme| value.strip_prefix(scheme))
        .map(str::trim))
}

fn extract_bearer(
    token: &str,
    raw_header: String,
    headers: &HeaderMap,
) -> Result<Authenticated, AuthError> {
    if token.is_empty() {
        return Err(AuthError::Malformed("empty bearer token".to_string()));
    }

    jsonwebtoken::decode_header(token)
        .map_err(|e| AuthError::Malformed(format!("bearer token is not a valid JWT: {}", e)))?;

    let account_id = header_str(headers, ACCOUNT_HEADER)?
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AuthError::Malformed(format!(
                "bearer token requires the {} header",
                ACCOUNT_HEADER
            ))
        })?;

    Ok(Authenticated {
        account_id: account_id.to_string(),
        material: AuthMaterial::Bearer { raw_header },
    })
}

/// Account id is the second dot-delimited segment: `prefix.ACCOUNT_ID.TOKEN_ID.secret`.
fn account_from_api_key(raw_key: &str) -> Result<String, AuthError> {
    let mut segments = raw_key.split('.');
    let _prefix = segments.next();
    segments
        .next()
        .filter(|account| !account.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::Malformed("API key must have the form prefix.account.token.secret".to_string()))
}
