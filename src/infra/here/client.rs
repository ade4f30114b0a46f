use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::fetch::auth::UrlParam;
use crate::fetch::{BasicClient, HttpClient, fetch_json};
use crate::services::speed_limit::{SegmentKey, SpeedLimitLookup};

/// Environment variable holding the HERE API key.
pub const HERE_API_KEY_ENV: &str = "HERE_API_KEY";

const REVGEOCODE_URL: &str = "https://revgeocode.search.hereapi.com/v1/revgeocode";

/// Search radius in metres around the sample position.
const SEARCH_RADIUS_M: u32 = 50;

#[derive(Debug, Deserialize)]
struct RevGeocodeResponse {
    #[serde(default)]
    items: Vec<RevGeocodeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevGeocodeItem {
    #[serde(default)]
    navigation_attributes: Option<NavigationAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigationAttributes {
    #[serde(default)]
    speed_limits: Vec<SpeedLimitEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeedLimitEntry {
    max_speed: Option<f64>,
}

/// Looks up the posted limit of the street nearest a segment.
///
/// One request per call and no retries; the cache in front of it makes sure
/// each segment is asked for once.
pub struct HereSpeedLimitClient<C = UrlParam<BasicClient>> {
    base_url: String,
    client: C,
}

impl HereSpeedLimitClient {
    pub fn new(api_key: String) -> Result<Self> {
        let basic = BasicClient::with_timeout(Duration::from_secs(30))?;
        Ok(Self::with_client(
            UrlParam::new(basic, "apiKey", api_key),
            REVGEOCODE_URL,
        ))
    }

    /// Builds a client from the `HERE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(HERE_API_KEY_ENV).map_err(|_| {
            MetricsError::invalid_config(format!(
                "{HERE_API_KEY_ENV} must be set to use the external speed lookup"
            ))
        })?;
        Self::new(key)
    }
}

impl<C: HttpClient> HereSpeedLimitClient<C> {
    pub fn with_client(client: C, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

/// Smallest posted limit of the first street returned, if any.
fn smallest_limit(response: &RevGeocodeResponse) -> Option<f64> {
    response
        .items
        .first()?
        .navigation_attributes
        .as_ref()?
        .speed_limits
        .iter()
        .filter_map(|sl| sl.max_speed)
        .reduce(f64::min)
}

#[async_trait]
impl<C: HttpClient> SpeedLimitLookup for HereSpeedLimitClient<C> {
    async fn lookup(&self, key: &SegmentKey) -> Result<Option<f64>> {
        let at = format!("{},{},{}", key.latitude(), key.longitude(), SEARCH_RADIUS_M);
        let params = [
            ("at", at.as_str()),
            ("maxResults", "1"),
            ("showNavAttributes", "speedLimits"),
            ("types", "street"),
        ];

        debug!(segment = %key, "Calling HERE API");
        let json = fetch_json(&self.client, &self.base_url, &params)
            .await
            .map_err(|e| MetricsError::LookupUnavailable(e.to_string()))?;

        let response: RevGeocodeResponse = serde_json::from_value(json)
            .map_err(|e| MetricsError::LookupUnavailable(format!("unexpected response: {e}")))?;

        Ok(smallest_limit(&response))
    }
}
