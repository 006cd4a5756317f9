mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;
use serde::Serialize;

/// POSTs `body` as JSON through `client` and returns the raw response. Status
/// handling is left to the caller.
pub async fn post_json<C: HttpClient + ?Sized, T: Serialize + ?Sized>(
    client: &C,
    url: &str,
    body: &T,
) -> Result<reqwest::Response> {
    let mut req = reqwest::Request::new(reqwest::Method::POST, url.parse()?);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );
    *req.body_mut() = Some(serde_json::to_vec(body)?.into());

    Ok(client.execute(req).await?)
}
