//! Itinerary command handlers.

use anyhow::{Context, Result};
use shiori_core::api::itinerary_endpoints;
use shiori_core::{RequestOptions, SessionClient};

use super::request::print_response;

pub async fn list(client: &SessionClient) -> Result<()> {
    let response = client
        .request_endpoint(itinerary_endpoints::LIST, RequestOptions::get())
        .await
        .context("list itineraries")?;
    print_response(response).await
}

pub async fn show(client: &SessionClient, id: &str) -> Result<()> {
    let response = client
        .request_endpoint(&itinerary_endpoints::detail(id), RequestOptions::get())
        .await
        .with_context(|| format!("fetch itinerary {id}"))?;
    print_response(response).await
}

pub async fn delete(client: &SessionClient, id: &str) -> Result<()> {
    let response = client
        .request_endpoint(&itinerary_endpoints::delete(id), RequestOptions::delete())
        .await
        .with_context(|| format!("delete itinerary {id}"))?;
    print_response(response).await?;
    println!("Deleted itinerary {id}");
    Ok(())
}
