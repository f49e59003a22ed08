//! Caller authentication and scope resolution.

pub mod extractor;
pub mod middleware;
pub mod scope;

pub use extractor::{
    ACCOUNT_HEADER, API_KEY_HEADER, AuthError, AuthExtractor, AuthMaterial, Authenticated,
};
pub use middleware::{AuthRejection, ORG_HEADER, PROJECT_HEADER, ScopeResolver, auth_middleware};
pub use scope::Scope;
