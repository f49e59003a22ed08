//! Scope resolution middleware.
//!
//! Never rejects a request itself: whether a missing identity is fatal depends
//! on what the request is trying to do, which is decided further down the
//! stack. On success the request gains a [`Scope`] and the caller's
//! [`AuthMaterial`]; on failure it gains an [`AuthRejection`].

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{AuthError, AuthExtractor, AuthMaterial, Scope};

/// Optional caller-supplied narrowing of the scope.
pub const ORG_HEADER: &str = "x-org-id";
pub const PROJECT_HEADER: &str = "x-project-id";

/// Why the request has no scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRejection(pub AuthError);

/// Turns request headers into a [`Scope`] plus forwardable credential.
#[derive(Debug, Clone, Default)]
pub struct ScopeResolver {
    extractor: AuthExtractor,
    default_org_id: Option<String>,
    default_project_id: Option<String>,
}

impl ScopeResolver {
    pub fn new(
        extractor: AuthExtractor,
        default_org_id: Option<String>,
        default_project_id: Option<String>,
    ) -> Self {
        Self {
            extractor,
            default_org_id,
            default_project_id,
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Result<(Scope, AuthMaterial), AuthError> {
        let auth = self.extractor.extract(headers)?;

        let scope = Scope::account(auth.account_id)
            .with_org(self.default_org_id.clone())
            .with_project(self.default_project_id.clone())
            .overridden(
                header_value(headers, ORG_HEADER),
                header_value(headers, PROJECT_HEADER),
            );

        Ok((scope, auth.material))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

pub async fn auth_middleware(
    State(resolver): State<Arc<ScopeResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    match resolver.resolve(req.headers()) {
        Ok((scope, material)) => {
            tracing::debug!(
                account_id = %scope.account_id,
                org_id = scope.org_id.as_deref().unwrap_or("-"),
                project_id = scope.project_id.as_deref().unwrap_or("-"),
                auth_source = material.source(),
                "Resolved request scope"
            );
            req.extensions_mut().insert(scope);
            req.extensions_mut().insert(material);
        }
        Err(err) => {
            tracing::debug!(error = %err, "Request scope not resolved");
            req.extensions_mut().insert(AuthRejection(err));
        }
    }

    next.run(req).await
}
