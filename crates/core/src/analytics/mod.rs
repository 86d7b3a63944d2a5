//! Carbon analytics: per-page estimates, record sinks, daily roll-ups and reports.

pub mod db;
pub mod metrics;
pub mod report;
pub mod sink;

pub use metrics::{OptimizationKind, PageEstimate, PageKind, PageProfile, estimate_page};
pub use report::{Assessment, GoalProgress, PeriodSummary, WeekComparison};
pub use sink::{AnalyticsError, AnalyticsRecord, AnalyticsSink, MemorySink};
