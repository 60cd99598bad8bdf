//! Sign-in, session status checks and logout.
//!
//! These calls bypass refresh handling: they ask "is there a session right
//! now" (or create one) and must not trigger renewals or redirects themselves.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::api::auth_endpoints;
use crate::error::{FetchError, FetchResult};
use crate::session::{RequestOptions, SessionClient};

/// Signed-in user as reported by `/auth/protected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtectedUser {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtectedResponse {
    #[serde(default)]
    user: Option<ProtectedUser>,
}

impl From<ProtectedUser> for User {
    fn from(user: ProtectedUser) -> Self {
        // Accounts without a display name show the local part of their email.
        let name = user
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| {
                user.email
                    .split('@')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            });
        Self {
            id: user.id,
            email: user.email,
            name,
            created_at: user.created_at,
        }
    }
}

/// Result of a sign-in attempt that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session cookies were issued
    SignedIn,
    InvalidCredentials,
    EmailNotVerified,
    Failed {
        status: StatusCode,
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Signs in with email and password. On success the server's session
/// cookies land in the client's cookie store.
///
/// # Errors
/// Returns an error if the request cannot be built or sent.
pub async fn login(
    client: &SessionClient,
    email: &str,
    password: &str,
) -> FetchResult<LoginOutcome> {
    let url = client.url(auth_endpoints::LOGIN);
    let options = RequestOptions::post().json(&serde_json::json!({
        "email": email.trim(),
        "password": password,
    }))?;
    let response = client.send_plain(&url, &options).await?;

    let status = response.status();
    let outcome = match status {
        _ if status.is_success() => LoginOutcome::SignedIn,
        StatusCode::UNAUTHORIZED => LoginOutcome::InvalidCredentials,
        StatusCode::FORBIDDEN => LoginOutcome::EmailNotVerified,
        _ => LoginOutcome::Failed {
            status,
            message: response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message),
        },
    };
    tracing::debug!(%status, ?outcome, "login finished");
    Ok(outcome)
}

/// Returns true if the current session cookie is accepted. Errors count as signed out.
pub async fn check_auth_status(client: &SessionClient) -> bool {
    let url = client.url(auth_endpoints::PROTECTED);
    match client.send_plain(&url, &RequestOptions::get()).await {
        Ok(response) => {
            tracing::debug!(status = %response.status(), "auth status checked");
            response.status().is_success()
        }
        Err(err) => {
            tracing::warn!(error = %err, "auth status check failed");
            false
        }
    }
}

/// Fetches the signed-in user, or `None` when there is no valid session.
///
/// # Errors
/// Returns an error on transport failure or a malformed success body.
pub async fn current_user(client: &SessionClient) -> FetchResult<Option<User>> {
    let url = client.url(auth_endpoints::PROTECTED);
    let response = client.send_plain(&url, &RequestOptions::get()).await?;
    if !response.status().is_success() {
        return Ok(None);
    }

    let body = response.text().await?;
    let parsed: ProtectedResponse = serde_json::from_str(&body).map_err(|e| {
        FetchError::parse("Failed to parse /auth/protected response").with_details(e.to_string())
    })?;
    Ok(parsed.user.map(User::from))
}

/// Ends the session on the server, drops local cookies, then sends the user
/// to the login page.
///
/// Cookies are cleared and the redirect happens whether or not the logout
/// call succeeded; the returned error only reports a transport failure.
///
/// # Errors
/// Returns an error if the logout request could not be sent.
pub async fn logout(client: &SessionClient) -> FetchResult<()> {
    let url = client.url(auth_endpoints::LOGOUT);
    let result = client.send_plain(&url, &RequestOptions::post()).await;
    client.cookies().clear();
    client
        .navigator()
        .redirect(&client.settings().pages.login);

    match result {
        Ok(response) => {
            if !response.status().is_success() {
                tracing::warn!(status = %response.status(), "logout returned non-success status");
            }
            Ok(())
        }
        Err(err) => {
            tracing::warn!(error = %err, "logout failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use reqwest::cookie::CookieStore;

    use super::*;
    use crate::session::{Navigator, SessionSettings};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Navigator for Recorder {
        fn current_path(&self) -> String {
            "/itineraries".to_string()
        }

        fn redirect(&self, path: &str) {
            self.0.lock().unwrap().push(path.to_string());
        }
    }

    fn client(base: &str) -> (SessionClient, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let client = SessionClient::new(
            SessionSettings::new(base),
            Arc::clone(&recorder) as Arc<dyn Navigator>,
        )
        .unwrap();
        (client, recorder)
    }

    #[tokio::test]
    async fn test_login_stores_session_cookie() {
        use wiremock::matchers::{body_json, header};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(serde_json::json!({
                "email": "hanako@example.jp",
                "password": "SecurePass123!"
            })))
            .respond_with(ResponseTemplate::new(204).insert_header(
                "set-cookie",
                "access_token=jwt-1; Path=/; HttpOnly; Max-Age=900",
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .and(header("cookie", "access_token=jwt-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "id": "u1", "email": "hanako@example.jp" }
            })))
            .mount(&server)
            .await;

        let (client, recorder) = client(&server.uri());
        let outcome = login(&client, " hanako@example.jp ", "SecurePass123!")
            .await
            .unwrap();

        assert_eq!(outcome, LoginOutcome::SignedIn);
        assert_eq!(client.cookies().len(), 1);
        assert!(check_auth_status(&client).await);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_failures_do_not_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        for (status, expected) in [
            (401, LoginOutcome::InvalidCredentials),
            (403, LoginOutcome::EmailNotVerified),
            (
                400,
                LoginOutcome::Failed {
                    status: StatusCode::BAD_REQUEST,
                    message: Some("Invalid email".to_string()),
                },
            ),
        ] {
            let _guard = Mock::given(method("POST"))
                .and(path("/auth/login"))
                .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                    "error": "invalid_body",
                    "message": "Invalid email"
                })))
                .mount_as_scoped(&server)
                .await;

            let (client, _) = client(&server.uri());
            let outcome = login(&client, "hanako@example.jp", "wrong").await.unwrap();
            assert_eq!(outcome, expected);
            assert!(client.cookies().is_empty());
        }
    }

    #[tokio::test]
    async fn test_check_auth_status_reflects_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, recorder) = client(&server.uri());
        assert!(!check_auth_status(&client).await);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_auth_status_false_when_unreachable() {
        let (client, _) = client("http://127.0.0.1:9");
        assert!(!check_auth_status(&client).await);
    }

    #[tokio::test]
    async fn test_current_user_falls_back_to_email_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "ok",
                "user": { "id": "u1", "email": "hanako@example.jp" }
            })))
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let user = current_user(&client).await.unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.name, "hanako");
        assert_eq!(user.created_at, None);
        assert!(check_auth_status(&client).await);
    }

    #[tokio::test]
    async fn test_current_user_keeps_given_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": {
                    "id": "u2",
                    "email": "taro@example.jp",
                    "name": "Taro",
                    "createdAt": "2025-04-01T00:00:00.000Z"
                }
            })))
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let user = current_user(&client).await.unwrap().unwrap();
        assert_eq!(user.name, "Taro");
        assert_eq!(user.created_at.as_deref(), Some("2025-04-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_current_user_none_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        assert_eq!(current_user(&client).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_current_user_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/protected"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let err = current_user(&client).await.unwrap_err();
        assert_eq!(err.kind, crate::FetchErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_logout_redirects_even_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (client, recorder) = client(&server.uri());
        client.cookies().set_cookies(
            &mut [reqwest::header::HeaderValue::from_static("access_token=jwt-1; Path=/")].iter(),
            &reqwest::Url::parse(&server.uri()).unwrap(),
        );
        assert_eq!(client.cookies().len(), 1);

        logout(&client).await.unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec!["/login".to_string()]);
        assert!(client.cookies().is_empty());

        let (offline, offline_recorder) = self::client("http://127.0.0.1:9");
        assert!(logout(&offline).await.is_err());
        assert_eq!(
            *offline_recorder.0.lock().unwrap(),
            vec!["/login".to_string()]
        );
    }
}
