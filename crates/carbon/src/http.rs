//! HTTP carbon-intensity source.
//!
//! Talks to the Electricity Maps `v3/carbon-intensity/latest` endpoint,
//! authenticated with an `auth-token` header.

use crate::provider::{CarbonError, IntensitySource, RawReading};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.electricitymap.org";
/// Upper bound on a single upstream call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Wire shape of the `latest` response. Only the fields we use.
#[derive(Deserialize)]
struct LatestResponse {
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: Option<serde_json::Value>,
    datetime: Option<String>,
}

/// Carbon-intensity source backed by the Electricity Maps HTTP API.
pub struct ElectricityMapsSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ElectricityMapsSource {
    /// Build from API key + optional base URL override + request timeout.
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/carbon-intensity/latest", self.base_url)
    }

    async fn fetch_latest(&self, zone: &str) -> Result<RawReading, CarbonError> {
        if self.api_key.trim().is_empty() {
            return Err(CarbonError::MissingApiKey);
        }

        let resp = self
            .client
            .get(self.endpoint())
            .query(&[("zone", zone)])
            .header("auth-token", &self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CarbonError::RequestFailed(format!("{status}: {text}")));
        }

        let body = resp.text().await.map_err(map_transport_error)?;
        parse_latest(&body)
    }
}

fn map_transport_error(e: reqwest::Error) -> CarbonError {
    if e.is_timeout() {
        CarbonError::Timeout
    } else {
        CarbonError::RequestFailed(e.to_string())
    }
}

/// Parse a `latest` response body. `carbonIntensity` is required; an
/// unparsable `datetime` is dropped so the default TTL applies.
pub fn parse_latest(body: &str) -> Result<RawReading, CarbonError> {
    let api: LatestResponse =
        serde_json::from_str(body).map_err(|e| CarbonError::InvalidResponse(e.to_string()))?;

    let carbon_intensity = api
        .carbon_intensity
        .as_ref()
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| CarbonError::InvalidResponse("missing carbonIntensity".into()))?;

    let datetime = api.datetime.as_deref().and_then(|raw| {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::debug!(datetime = raw, error = %e, "ignoring unparsable datetime");
                None
            }
        }
    });

    Ok(RawReading { carbon_intensity, datetime })
}

impl IntensitySource for ElectricityMapsSource {
    fn name(&self) -> &str {
        "electricitymaps"
    }

    fn fetch<'a>(
        &'a self,
        zone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RawReading, CarbonError>> + Send + 'a>> {
        Box::pin(self.fetch_latest(zone))
    }
}

/// Build a source from environment variables.
/// `GRIDAWARE_API_KEY` wins over `fallback_key` (the stored setting) when set
/// and non-empty; `GRIDAWARE_API_BASE_URL` optionally overrides the endpoint.
pub fn from_env(fallback_key: &str, timeout: Duration) -> ElectricityMapsSource {
    let api_key = pick_key(std::env::var("GRIDAWARE_API_KEY").ok(), fallback_key);
    let base_url = std::env::var("GRIDAWARE_API_BASE_URL").ok();
    ElectricityMapsSource::new(api_key, base_url, timeout)
}

fn pick_key(env_key: Option<String>, fallback_key: &str) -> String {
    env_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(|| fallback_key.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source(key: &str, base: Option<&str>) -> ElectricityMapsSource {
        ElectricityMapsSource::new(
            key.into(),
            base.map(str::to_owned),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    #[test]
    fn env_key_beats_stored_key() {
        assert_eq!(pick_key(Some("env".into()), "stored"), "env");
        assert_eq!(pick_key(Some("  ".into()), "stored"), "stored");
        assert_eq!(pick_key(None, "stored"), "stored");
        assert_eq!(pick_key(None, ""), "");
    }

    #[test]
    fn default_endpoint() {
        let s = source("k", None);
        assert_eq!(s.endpoint(), "https://api.electricitymap.org/v3/carbon-intensity/latest");
        assert_eq!(s.name(), "electricitymaps");
    }

    #[test]
    fn custom_base_url_trims_slash() {
        let s = source("k", Some("http://localhost:8080/"));
        assert_eq!(s.endpoint(), "http://localhost:8080/v3/carbon-intensity/latest");
    }

    #[test]
    fn parses_intensity_and_datetime() {
        let raw = parse_latest(
            r#"{"zone":"SE","carbonIntensity":41,"datetime":"2025-03-01T12:00:00.000Z"}"#,
        )
        .unwrap();
        assert_eq!(raw.carbon_intensity, 41.0);
        assert_eq!(raw.datetime, Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    }

    #[test]
    fn fractional_intensity() {
        let raw = parse_latest(r#"{"carbonIntensity":212.5}"#).unwrap();
        assert_eq!(raw.carbon_intensity, 212.5);
        assert!(raw.datetime.is_none());
    }

    #[test]
    fn missing_intensity_is_invalid() {
        let err = parse_latest(r#"{"zone":"SE","datetime":"2025-03-01T12:00:00Z"}"#).unwrap_err();
        assert!(matches!(err, CarbonError::InvalidResponse(_)));
    }

    #[test]
    fn non_numeric_intensity_is_invalid() {
        let err = parse_latest(r#"{"carbonIntensity":"high"}"#).unwrap_err();
        assert!(matches!(err, CarbonError::InvalidResponse(_)));
    }

    #[test]
    fn malformed_json_is_invalid() {
        assert!(matches!(parse_latest("<html>"), Err(CarbonError::InvalidResponse(_))));
    }

    #[test]
    fn bad_datetime_is_dropped() {
        let raw = parse_latest(r#"{"carbonIntensity":300,"datetime":"yesterday"}"#).unwrap();
        assert_eq!(raw.carbon_intensity, 300.0);
        assert!(raw.datetime.is_none());
    }

    #[tokio::test]
    async fn empty_key_fails_without_request() {
        // Unroutable base: a network attempt would surface as RequestFailed, not MissingApiKey.
        let s = source("  ", Some("http://127.0.0.1:9"));
        assert_eq!(s.fetch("SE").await, Err(CarbonError::MissingApiKey));
    }
}
