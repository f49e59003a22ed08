//! Multi-tenant tool gateway.
//!
//! Callers reach platform tools over JSON-RPC; which tools they can see and
//! call depends on the modules their account is licensed for.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod license;
pub mod middleware;
pub mod modules;
pub mod protocol;
pub mod services;
pub mod startup;
pub mod toolsets;

pub use startup::{AppState, Application, build_router};
