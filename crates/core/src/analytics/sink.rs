use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{OptimizationKind, PageEstimate};
use crate::types::GridMode;

/// One analytics row: a page view or an individual optimization event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub timestamp: DateTime<Utc>,
    pub mode: GridMode,
    pub intensity: f64,
    pub region: String,
    /// 1 for page views, 0 for optimization events.
    pub page_views: i32,
    pub data_transferred_kb: f64,
    pub estimated_carbon_g: f64,
    pub savings_carbon_g: f64,
    pub actions: serde_json::Value,
}

impl AnalyticsRecord {
    pub fn page_view(
        timestamp: DateTime<Utc>,
        mode: GridMode,
        intensity: f64,
        region: impl Into<String>,
        estimate: &PageEstimate,
        actions: &[&str],
    ) -> Self {
        Self {
            timestamp,
            mode,
            intensity,
            region: region.into(),
            page_views: 1,
            data_transferred_kb: estimate.data_kb,
            estimated_carbon_g: estimate.carbon_g,
            savings_carbon_g: estimate.savings_g,
            actions: serde_json::json!(actions),
        }
    }

    /// Record for a single optimization; carries savings only.
    pub fn optimization(
        timestamp: DateTime<Utc>,
        mode: GridMode,
        intensity: f64,
        region: impl Into<String>,
        kind: OptimizationKind,
        measured_kb: Option<f64>,
        context: &str,
    ) -> Self {
        let (saved_kb, saved_g) = kind.savings(measured_kb, intensity);
        Self {
            timestamp,
            mode,
            intensity,
            region: region.into(),
            page_views: 0,
            data_transferred_kb: saved_kb,
            estimated_carbon_g: 0.0,
            savings_carbon_g: saved_g,
            actions: serde_json::json!({ "type": kind.as_str(), "context": context }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record rejected: {0}")]
    Rejected(String),
}

/// Destination for analytics records. Implementations must not assume the
/// caller waits for completion.
#[async_trait::async_trait]
pub trait AnalyticsSink: Send + Sync {
    fn name(&self) -> &str;
    async fn record(&self, record: AnalyticsRecord) -> Result<(), AnalyticsError>;
}

/// In-memory sink for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AnalyticsRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnalyticsRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AnalyticsSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, record: AnalyticsRecord) -> Result<(), AnalyticsError> {
        self.records
            .lock()
            .map_err(|e| AnalyticsError::Rejected(e.to_string()))?
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::metrics::{PageKind, PageProfile, estimate_page};

    #[tokio::test]
    async fn memory_sink_collects() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        let profile = PageProfile { kind: PageKind::Single, content_bytes: 0, image_count: 1 };
        let estimate = estimate_page(&profile, GridMode::Eco, 260.0);
        let rec = AnalyticsRecord::page_view(Utc::now(), GridMode::Eco, 260.0, "SE", &estimate, &["lazy_loading"]);
        sink.record(rec.clone()).await.unwrap();
        assert_eq!(sink.records(), vec![rec]);
    }

    #[test]
    fn optimization_record_has_no_page_view() {
        let rec = AnalyticsRecord::optimization(
            Utc::now(),
            GridMode::SuperEco,
            400.0,
            "SE",
            OptimizationKind::TinyPlaceholders,
            None,
            "the_content",
        );
        assert_eq!(rec.page_views, 0);
        assert_eq!(rec.data_transferred_kb, 75.0);
        assert_eq!(rec.estimated_carbon_g, 0.0);
        assert_eq!(rec.actions["type"], "tiny_placeholders");
    }

    #[test]
    fn page_view_actions_are_json_array() {
        let estimate = PageEstimate { baseline_kb: 1.0, data_kb: 1.0, carbon_g: 0.0, savings_g: 0.0 };
        let rec = AnalyticsRecord::page_view(Utc::now(), GridMode::Standard, 100.0, "SE", &estimate, &[]);
        assert_eq!(rec.page_views, 1);
        assert_eq!(rec.actions, serde_json::json!([]));
    }
}
