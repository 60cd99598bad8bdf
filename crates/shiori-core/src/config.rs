//! Configuration management for Shiori.
//!
//! Loads configuration from ${SHIORI_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api;
use crate::session::PagePaths;

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// This ensures new comments/sections from the template are always present,
/// while preserving user's customized values.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    overlay_user_values(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Copies user values onto the template, one section at a time.
///
/// `[session]` and `[pages]` keep the template's comments for keys the user
/// never set. Keys and sections the template doesn't know are carried over
/// as written.
fn overlay_user_values(template: &mut toml_edit::Table, user: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, item) in user {
        if let (Item::Table(user_section), Some(Item::Table(template_section))) =
            (item, template.get_mut(key))
        {
            overlay_user_values(template_section, user_section);
            continue;
        }
        if !item.is_none() {
            template[key] = item.clone();
        }
    }
}

pub mod paths {
    //! Path resolution for Shiori configuration.
    //!
    //! SHIORI_HOME resolution order:
    //! 1. SHIORI_HOME environment variable (if set)
    //! 2. ~/.config/shiori (default)

    use std::path::PathBuf;

    /// Returns the Shiori home directory.
    pub fn shiori_home() -> PathBuf {
        if let Ok(home) = std::env::var("SHIORI_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".shiori"),
            |h| h.join(".config").join("shiori"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        shiori_home().join("config.toml")
    }

    /// Returns the path to the saved session cookies.
    pub fn cookies_path() -> PathBuf {
        shiori_home().join("cookies.json")
    }
}

/// Session refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint that renews the session cookie pair
    pub refresh_path: String,
    /// How long a settled refresh outcome is reused, in milliseconds
    pub settle_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_path: api::auth_endpoints::REFRESH.to_string(),
            settle_delay_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Shiori API
    pub api_base_url: Option<String>,

    /// Client-wide request timeout in seconds (0 disables)
    pub request_timeout_secs: u32,

    /// Session refresh settings
    pub session: SessionConfig,

    /// Page paths used for redirects
    pub pages: PagePaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: Self::DEFAULT_REQUEST_TIMEOUT_SECS,
            session: SessionConfig::default(),
            pages: PagePaths::default(),
        }
    }
}

impl Config {
    /// Default is disabled
    const DEFAULT_REQUEST_TIMEOUT_SECS: u32 = 0;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Returns the effective API base URL (env > config > default).
    ///
    /// # Errors
    /// Returns an error if the configured URL is malformed.
    pub fn api_base_url(&self) -> Result<String> {
        api::resolve_base_url(self.api_base_url.as_deref())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.request_timeout_secs)))
        }
    }

    /// Saves only the `api_base_url` field to the default config file.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_api_base_url(url: &str) -> Result<()> {
        Self::save_api_base_url_to(&paths::config_path(), url)
    }

    /// Saves only the `api_base_url` field to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_api_base_url_to(path: &Path, url: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let url = url.trim();
        api::validate_url(url)?;

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        doc["api_base_url"] = value(url.trim_end_matches('/'));

        Self::write_config(path, &doc.to_string())
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.api_base_url, None);
        assert_eq!(config.session.refresh_path, "/auth/refresh");
        assert_eq!(config.session.settle_delay(), Duration::from_millis(100));
        assert_eq!(config.pages.login, "/login");
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "api_base_url = \"https://shiori.example\"\n\n[pages]\nlogin = \"/signin\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://shiori.example")
        );
        assert_eq!(config.pages.login, "/signin");
        assert_eq!(config.pages.editor, "/edit");
        assert_eq!(config.session.settle_delay_ms, 100);
    }

    #[test]
    fn test_default_template_parses_to_defaults() {
        let config: Config = toml::from_str(default_config_template()).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some(api::DEFAULT_API_BASE_URL)
        );
        assert_eq!(config.pages.shared_prefix, "/shared");
        assert_eq!(config.request_timeout_secs, 0);
    }

    #[test]
    fn test_request_timeout_nonzero() {
        let config = Config {
            request_timeout_secs: 30,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Shiori Configuration"));
        assert!(contents.contains("settle_delay_ms = 100"));
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "# existing").unwrap();

        let err = Config::init(&config_path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_save_api_base_url_preserves_other_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "request_timeout_secs = 15\n\n[session]\nsettle_delay_ms = 250\n",
        )
        .unwrap();

        Config::save_api_base_url_to(&config_path, "https://api.shiori.example/").unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.api_base_url.as_deref(),
            Some("https://api.shiori.example")
        );
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.session.settle_delay_ms, 250);

        // Template comments come back with the merge
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("# Shiori Configuration"));
    }

    #[test]
    fn test_merge_keeps_template_keys_and_unknown_sections() {
        let merged = merge_with_template(
            "[pages]\nlogin = \"/signin\"\n\n[experimental]\nflag = true\n",
        )
        .unwrap();

        let config: Config = toml::from_str(&merged).unwrap();
        assert_eq!(config.pages.login, "/signin");
        assert_eq!(config.pages.editor, "/edit");
        assert_eq!(config.session.refresh_path, "/auth/refresh");

        let doc: toml_edit::DocumentMut = merged.parse().unwrap();
        assert_eq!(doc["experimental"]["flag"].as_bool(), Some(true));
        assert!(merged.contains("# Shiori Configuration"));
    }

    #[test]
    fn test_save_api_base_url_rejects_invalid_url() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        assert!(Config::save_api_base_url_to(&config_path, "not a url").is_err());
        assert!(!config_path.exists());
    }
}
