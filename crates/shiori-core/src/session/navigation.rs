//! Navigation capability used when a session cannot be renewed.

use serde::{Deserialize, Serialize};

/// Reports where the user currently is and moves them elsewhere.
///
/// A browser front end maps this onto its location object; the CLI prints a hint.
pub trait Navigator: Send + Sync {
    /// Path of the page the user is currently on (e.g. `/itineraries`).
    fn current_path(&self) -> String;

    /// Sends the user to `path`.
    fn redirect(&self, path: &str);
}

/// Page paths that drive redirect decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagePaths {
    /// Redirect target when the session is gone
    pub login: String,
    /// Editor page, usable without a session
    pub editor: String,
    /// Prefix of publicly shared itineraries
    pub shared_prefix: String,
    /// Landing page for signed-in users
    pub itineraries: String,
}

impl Default for PagePaths {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            editor: "/edit".to_string(),
            shared_prefix: "/shared".to_string(),
            itineraries: "/itineraries".to_string(),
        }
    }
}

impl PagePaths {
    /// Returns true when an expired session must not bounce `path` to the login page.
    pub fn is_redirect_exempt(&self, path: &str) -> bool {
        path.starts_with(&self.shared_prefix) || path == self.login || path == self.editor
    }
}
