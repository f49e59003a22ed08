//! License state: authoritative lookup plus a TTL cache in front of it.

pub mod cache;
pub mod client;

pub use cache::{LicenseCache, LicenseCacheEntry};
pub use client::{
    DEFAULT_ENDPOINT_PATH, LicenseClient, LicenseClientConfig, LicenseError, LicenseLookup,
};
