//! Raw request command handler.

use anyhow::{Context, Result};
use reqwest::{Method, Response};
use shiori_core::{RequestOptions, SessionClient};

pub async fn run(
    client: &SessionClient,
    endpoint: &str,
    method: &str,
    headers: &[String],
    data: Option<String>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;

    let mut options = RequestOptions::method(method);
    for raw in headers {
        let (name, value) = raw
            .split_once(':')
            .with_context(|| format!("invalid header (expected 'Name: value'): {raw}"))?;
        options = options.header(name.trim(), value.trim())?;
    }
    if let Some(data) = data {
        options = options.body(data);
    }

    let response = client
        .request_endpoint(endpoint, options)
        .await
        .with_context(|| format!("request {endpoint}"))?;
    print_response(response).await
}

/// Prints the body (pretty JSON when possible) and fails on non-2xx.
pub async fn print_response(response: Response) -> Result<()> {
    let status = response.status();
    let body = response.text().await.context("read response body")?;

    if !body.is_empty() {
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            Err(_) => println!("{body}"),
        }
    }

    if !status.is_success() {
        anyhow::bail!("HTTP {status}");
    }
    Ok(())
}
