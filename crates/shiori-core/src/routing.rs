//! Entry-point routing for the web front end.
//!
//! Decides where a request for `/` or `/login` should land based on whether
//! a session cookie is present. Every other path passes through.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::PagePaths;

/// Name of the cookie holding the access credential.
pub const SESSION_COOKIE: &str = "access_token";

static BOT_USER_AGENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bot|crawler|spider|crawling").expect("bot user agent pattern is valid")
});

/// What the router should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Send the client to another path
    Redirect(String),
    /// Serve another path's content under the requested URL
    Rewrite(String),
    /// Serve the requested path as-is
    Next,
}

/// Returns true if the user agent looks like a crawler.
pub fn is_bot(user_agent: &str) -> bool {
    BOT_USER_AGENT.is_match(user_agent)
}

/// Returns true if a `Cookie` header carries the session cookie.
pub fn has_session_cookie(cookie_header: &str) -> bool {
    cookie_header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == SESSION_COOKIE && !value.is_empty())
}

/// Routes the root and login paths.
///
/// - `/login` with a session goes to the itinerary list.
/// - `/` from a crawler is rewritten to the editor demo.
/// - `/` otherwise redirects to the itinerary list (session) or the editor (no session).
pub fn route(
    pages: &PagePaths,
    pathname: &str,
    has_session: bool,
    user_agent: Option<&str>,
) -> RouteDecision {
    if pathname == pages.login && has_session {
        return RouteDecision::Redirect(pages.itineraries.clone());
    }

    if pathname != "/" {
        return RouteDecision::Next;
    }

    if user_agent.is_some_and(is_bot) {
        return RouteDecision::Rewrite(pages.editor.clone());
    }

    if has_session {
        RouteDecision::Redirect(pages.itineraries.clone())
    } else {
        RouteDecision::Redirect(pages.editor.clone())
    }
}
