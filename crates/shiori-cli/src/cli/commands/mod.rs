//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod itineraries;
pub mod request;
pub mod route;
