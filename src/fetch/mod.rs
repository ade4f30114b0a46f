mod client;
mod basic;
pub mod auth;

pub use client::HttpClient;
pub use basic::BasicClient;

use crate::error::Result;

/// Issues a GET for `url` with `params` appended to its query string and
/// returns the response body as JSON.
///
/// Non-success statuses are returned as errors.
pub async fn fetch_json<C: HttpClient>(
    client: &C,
    url: &str,
    params: &[(&str, &str)],
) -> Result<serde_json::Value> {
    let mut url: reqwest::Url = url
        .parse()
        .map_err(|e| crate::error::MetricsError::invalid_config(format!("bad URL '{url}': {e}")))?;
    url.query_pairs_mut().extend_pairs(params);

    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.json().await?)
}
