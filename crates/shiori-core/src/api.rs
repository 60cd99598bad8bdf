//! API base URL resolution and endpoint paths.

use anyhow::{Context, Result};

/// Default API base URL (local backend).
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:4002";

/// Environment variable overriding the API base URL.
pub const API_BASE_URL_ENV: &str = "SHIORI_API_BASE_URL";

/// Standard User-Agent header for Shiori API requests.
pub const USER_AGENT: &str = concat!("shiori/", env!("CARGO_PKG_VERSION"));

/// Resolves the API base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the env or config value is not a valid URL.
pub fn resolve_base_url(config_base_url: Option<&str>) -> Result<String> {
    // Try env var first
    if let Ok(env_url) = std::env::var(API_BASE_URL_ENV) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    // Try config value
    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed)?;
            return Ok(trimmed.trim_end_matches('/').to_string());
        }
    }

    Ok(DEFAULT_API_BASE_URL.to_string())
}

/// Validates that a URL is well-formed.
///
/// # Errors
/// Returns an error if the URL cannot be parsed.
pub fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid API base URL: {url}"))?;
    Ok(())
}

/// Joins an endpoint path onto the base URL, inserting a leading `/` if missing.
pub fn build_api_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{base_url}{endpoint}")
    } else {
        format!("{base_url}/{endpoint}")
    }
}

/// Authentication endpoints.
pub mod auth_endpoints {
    pub const LOGIN: &str = "/auth/login";
    pub const PROTECTED: &str = "/auth/protected";
    pub const REFRESH: &str = "/auth/refresh";
    pub const LOGOUT: &str = "/auth/logout";
}

/// Itinerary endpoints.
pub mod itinerary_endpoints {
    pub const LIST: &str = "/api/itineraries";
    pub const CREATE: &str = "/api/itineraries";

    pub fn detail(id: &str) -> String {
        format!("{LIST}/{id}")
    }

    pub fn update(id: &str) -> String {
        detail(id)
    }

    pub fn delete(id: &str) -> String {
        detail(id)
    }
}
