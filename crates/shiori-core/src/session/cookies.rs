//! Session cookie store that survives between runs.
//!
//! Wraps reqwest's in-memory [`Jar`] and keeps a copy of every `Set-Cookie`
//! it accepts. Lifetimes are stored as absolute expiry times, so a cookie
//! reloaded from disk expires when the server said it would.

use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    /// URL of the response that set the cookie
    url: String,
    name: String,
    /// `Set-Cookie` value with `Max-Age` and `Expires` removed
    set_cookie: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredCookie {
    fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CookieFile {
    cookies: Vec<StoredCookie>,
}

struct ParsedCookie {
    name: String,
    set_cookie: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Splits a `Set-Cookie` value into name, lifetime-free attributes and an
/// absolute expiry. `Max-Age` wins over `Expires`.
fn parse_set_cookie(header: &str, now: DateTime<Utc>) -> Option<ParsedCookie> {
    let mut parts = header.split(';');
    let pair = parts.next()?.trim();
    let (name, _) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut kept = vec![pair.to_string()];
    let mut max_age = None;
    let mut expires = None;
    for attr in parts.map(str::trim).filter(|attr| !attr.is_empty()) {
        let (key, value) = attr
            .split_once('=')
            .map_or((attr, ""), |(key, value)| (key.trim(), value.trim()));
        if key.eq_ignore_ascii_case("max-age") {
            max_age = value
                .parse::<i64>()
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta));
        } else if key.eq_ignore_ascii_case("expires") {
            expires = DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|at| at.with_timezone(&Utc));
        } else {
            kept.push(attr.to_string());
        }
    }

    Some(ParsedCookie {
        name: name.to_string(),
        set_cookie: kept.join("; "),
        expires_at: max_age.or(expires),
    })
}

/// Cookie provider for [`super::SessionClient`] that can be saved to and
/// loaded from a JSON file.
#[derive(Default)]
pub struct SessionCookies {
    jar: Jar,
    stored: Mutex<Vec<StoredCookie>>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads cookies saved by [`Self::save`], dropping the expired ones.
    /// Returns an empty store if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let cookies = Self::new();
        if !path.exists() {
            return Ok(cookies);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cookies from {}", path.display()))?;
        let file: CookieFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cookies from {}", path.display()))?;

        let now = Utc::now();
        for cookie in file.cookies {
            cookies.restore(cookie, now);
        }
        tracing::debug!(path = %path.display(), count = cookies.len(), "loaded session cookies");
        Ok(cookies)
    }

    /// Saves unexpired cookies with restricted permissions (0600).
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let now = Utc::now();
        let file = CookieFile {
            cookies: self
                .lock()
                .iter()
                .filter(|cookie| !cookie.is_expired(now))
                .cloned()
                .collect(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(&file).context("Failed to serialize cookies")?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut out = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            out.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        Ok(())
    }

    /// Number of live cookies held.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.lock()
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every cookie, in memory and in the next save.
    pub fn clear(&self) {
        let mut stored = self.lock();
        for cookie in stored.drain(..) {
            if let Ok(url) = Url::parse(&cookie.url) {
                self.jar
                    .add_cookie_str(&format!("{}; Max-Age=0", cookie.set_cookie), &url);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredCookie>> {
        self.stored.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restore(&self, cookie: StoredCookie, now: DateTime<Utc>) {
        let header = match cookie.expires_at {
            Some(at) if at <= now => return,
            Some(at) => format!(
                "{}; Max-Age={}",
                cookie.set_cookie,
                (at - now).num_seconds().max(1)
            ),
            None => cookie.set_cookie.clone(),
        };
        let Ok(url) = Url::parse(&cookie.url) else {
            tracing::warn!(url = %cookie.url, "skipping stored cookie with invalid URL");
            return;
        };

        self.jar.add_cookie_str(&header, &url);
        self.lock().push(cookie);
    }

    /// Replaces any stored cookie with the same host and name.
    fn record(&self, header: &str, url: &Url, now: DateTime<Utc>) {
        let Some(parsed) = parse_set_cookie(header, now) else {
            return;
        };
        let host = url.host_str().map(str::to_string);

        let mut stored = self.lock();
        stored.retain(|cookie| !(cookie.name == parsed.name && cookie.host() == host));
        let cookie = StoredCookie {
            url: url.to_string(),
            name: parsed.name,
            set_cookie: parsed.set_cookie,
            expires_at: parsed.expires_at,
        };
        // A cookie set already expired is a deletion.
        if !cookie.is_expired(now) {
            stored.push(cookie);
        }
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        let now = Utc::now();
        for value in headers.iter().filter_map(|header| header.to_str().ok()) {
            self.record(value, url, now);
        }
        self.jar.set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}
