//! Core Shiori library (session client, API endpoints, routing, config).

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routing;
pub mod session;

pub use error::{FetchError, FetchErrorKind, FetchResult};
pub use session::{RequestOptions, SessionClient};
