use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::provider::{CarbonError, CarbonReading, IntensitySource};

/// Validity window when the upstream does not report a future forecast time.
pub const DEFAULT_TTL_SECS: i64 = 600;
/// Slack added past a reported forecast timestamp.
pub const FORECAST_BUFFER_SECS: i64 = 30;

/// When a reading fetched at `fetched_at` stops being valid.
pub fn valid_until(fetched_at: DateTime<Utc>, reported: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match reported {
        Some(at) if at > fetched_at => at + Duration::seconds(FORECAST_BUFFER_SECS),
        _ => fetched_at + Duration::seconds(DEFAULT_TTL_SECS),
    }
}

/// Zone-keyed TTL cache in front of an [`IntensitySource`].
///
/// Entries are immutable snapshots replaced wholesale. Concurrent misses may
/// each hit the source; the last successful write wins.
pub struct CarbonCache<S> {
    source: S,
    entries: RwLock<HashMap<String, CarbonReading>>,
}

impl<S: IntensitySource> CarbonCache<S> {
    pub fn new(source: S) -> Self {
        Self { source, entries: RwLock::new(HashMap::new()) }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Return the live reading for `zone`, fetching on miss or expiry.
    pub async fn get_carbon_intensity(&self, zone: &str) -> Result<CarbonReading, CarbonError> {
        self.get_carbon_intensity_at(zone, Utc::now()).await
    }

    /// Same as [`Self::get_carbon_intensity`] with an explicit clock.
    pub async fn get_carbon_intensity_at(
        &self,
        zone: &str,
        now: DateTime<Utc>,
    ) -> Result<CarbonReading, CarbonError> {
        if let Some(reading) = self.cached_at(zone, now).await {
            tracing::debug!(zone, intensity = reading.intensity, "carbon cache hit");
            return Ok(reading);
        }

        tracing::debug!(zone, source = self.source.name(), "carbon cache miss");
        let raw = self.source.fetch(zone).await?;
        let reading = CarbonReading {
            zone: zone.to_owned(),
            intensity: raw.carbon_intensity,
            fetched_at: now,
            valid_until: valid_until(now, raw.datetime),
        };
        tracing::info!(
            zone,
            intensity = reading.intensity,
            expires_in = reading.expires_in(now),
            "fetched carbon intensity"
        );

        self.entries.write().await.insert(zone.to_owned(), reading.clone());
        Ok(reading)
    }

    /// Peek at a live entry without touching the network.
    pub async fn cached(&self, zone: &str) -> Option<CarbonReading> {
        self.cached_at(zone, Utc::now()).await
    }

    async fn cached_at(&self, zone: &str, now: DateTime<Utc>) -> Option<CarbonReading> {
        self.entries
            .read()
            .await
            .get(zone)
            .filter(|r| r.is_live(now))
            .cloned()
    }

    /// Drop the entry for `zone` (e.g. after the zone setting changed).
    pub async fn invalidate(&self, zone: &str) -> bool {
        self.entries.write().await.remove(zone).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockSource;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ttl_uses_forecast_plus_buffer() {
        let reported = t0() + Duration::seconds(120);
        assert_eq!(valid_until(t0(), Some(reported)), t0() + Duration::seconds(150));
    }

    #[test]
    fn ttl_defaults_without_datetime() {
        assert_eq!(valid_until(t0(), None), t0() + Duration::seconds(600));
    }

    #[test]
    fn ttl_defaults_for_past_datetime() {
        let reported = t0() - Duration::seconds(3600);
        assert_eq!(valid_until(t0(), Some(reported)), t0() + Duration::seconds(600));
        assert_eq!(valid_until(t0(), Some(t0())), t0() + Duration::seconds(600));
    }

    #[tokio::test]
    async fn hit_does_not_refetch() {
        let cache = CarbonCache::new(MockSource::new(120.0));
        let first = cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        let second = cache
            .get_carbon_intensity_at("SE", t0() + Duration::seconds(599))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.source().calls(), 1);
    }

    #[tokio::test]
    async fn expiry_refetches() {
        let cache = CarbonCache::new(MockSource::new(120.0));
        cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        let later = t0() + Duration::seconds(600);
        let fresh = cache.get_carbon_intensity_at("SE", later).await.unwrap();
        assert_eq!(fresh.fetched_at, later);
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test]
    async fn zones_are_cached_independently() {
        let cache = CarbonCache::new(MockSource::new(300.0));
        cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        cache.get_carbon_intensity_at("DE", t0()).await.unwrap();
        cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let cache = CarbonCache::new(MockSource::failing(CarbonError::Timeout));
        assert_eq!(cache.get_carbon_intensity_at("SE", t0()).await, Err(CarbonError::Timeout));
        assert_eq!(cache.get_carbon_intensity_at("SE", t0()).await, Err(CarbonError::Timeout));
        assert_eq!(cache.source().calls(), 2);
        assert!(cache.cached("SE").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = CarbonCache::new(MockSource::new(90.0));
        cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        assert!(cache.invalidate("SE").await);
        assert!(!cache.invalidate("SE").await);
        cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        assert_eq!(cache.source().calls(), 2);
    }

    #[tokio::test]
    async fn clear_drops_every_zone() {
        let cache = CarbonCache::new(MockSource::new(250.0));
        cache.get_carbon_intensity("SE").await.unwrap();
        cache.get_carbon_intensity("DE").await.unwrap();
        cache.clear().await;
        assert!(cache.cached("SE").await.is_none());
        assert!(cache.cached("DE").await.is_none());
        cache.get_carbon_intensity("SE").await.unwrap();
        assert_eq!(cache.source().calls(), 3);
    }

    #[tokio::test]
    async fn forecast_window_drives_expiry() {
        let cache = CarbonCache::new(MockSource::with_datetime(410.0, t0() + Duration::seconds(300)));
        let reading = cache.get_carbon_intensity_at("SE", t0()).await.unwrap();
        assert_eq!(reading.valid_until, t0() + Duration::seconds(330));
        assert_eq!(reading.expires_in(t0()), 330);
    }
}
