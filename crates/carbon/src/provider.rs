use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reading as reported by an upstream source, before TTL bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    /// Grid carbon intensity in gCO2/kWh.
    pub carbon_intensity: f64,
    /// Self-reported timestamp of the reading's forecast window, if any.
    pub datetime: Option<DateTime<Utc>>,
}

/// A cached carbon-intensity snapshot for one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbonReading {
    pub zone: String,
    /// gCO2/kWh.
    pub intensity: f64,
    pub fetched_at: DateTime<Utc>,
    /// After this instant the reading must be refetched.
    pub valid_until: DateTime<Utc>,
}

impl CarbonReading {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }

    /// Seconds of validity left at `now` (0 once expired).
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.valid_until - now).num_seconds().max(0)
    }
}

/// Error type for carbon-intensity lookups.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CarbonError {
    #[error("API key is missing")]
    MissingApiKey,
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("API request timed out")]
    Timeout,
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl CarbonError {
    /// True for configuration problems as opposed to transport/upstream failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingApiKey)
    }
}

/// Trait for upstream carbon-intensity providers.
pub trait IntensitySource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch<'a>(
        &'a self,
        zone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RawReading, CarbonError>> + Send + 'a>>;
}

/// Mock source for testing. Returns a scripted reading or error and counts calls.
#[derive(Debug)]
pub struct MockSource {
    pub response: Result<RawReading, CarbonError>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(carbon_intensity: f64) -> Self {
        Self {
            response: Ok(RawReading { carbon_intensity, datetime: None }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock reading that reports a forecast timestamp.
    pub fn with_datetime(carbon_intensity: f64, datetime: DateTime<Utc>) -> Self {
        Self {
            response: Ok(RawReading { carbon_intensity, datetime: Some(datetime) }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that fails every fetch with `error`.
    pub fn failing(error: CarbonError) -> Self {
        Self { response: Err(error), calls: AtomicUsize::new(0) }
    }

    /// Number of fetches issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IntensitySource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch<'a>(
        &'a self,
        _zone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<RawReading, CarbonError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.clone();
        Box::pin(async move { response })
    }
}
