use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;

use super::report::PeriodSummary;
use super::sink::{AnalyticsError, AnalyticsRecord, AnalyticsSink};
use crate::types::GridMode;

/// Postgres-backed sink writing to `gridaware_analytics`.
#[derive(Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl AnalyticsSink for PgSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn record(&self, record: AnalyticsRecord) -> Result<(), AnalyticsError> {
        insert(&self.pool, &record).await?;
        Ok(())
    }
}

pub async fn insert(pool: &PgPool, record: &AnalyticsRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO gridaware_analytics
            (recorded_at, carbon_intensity, mode, page_views, data_transferred_kb,
             estimated_carbon_g, savings_carbon_g, actions, region)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(record.timestamp)
    .bind(record.intensity)
    .bind(record.mode.as_str())
    .bind(record.page_views)
    .bind(record.data_transferred_kb)
    .bind(record.estimated_carbon_g)
    .bind(record.savings_carbon_g)
    .bind(&record.actions)
    .bind(&record.region)
    .execute(pool)
    .await?;
    Ok(())
}

// ── Daily summaries ──

/// One row of `gridaware_daily_summary`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: PeriodSummary,
    /// Most aggressive mode served that day.
    pub peak_mode: GridMode,
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total_page_views: i64,
    total_data_kb: f64,
    total_carbon_g: f64,
    total_savings_g: f64,
    avg_carbon_intensity: f64,
}

impl From<TotalsRow> for PeriodSummary {
    fn from(row: TotalsRow) -> Self {
        Self {
            total_page_views: row.total_page_views,
            total_data_kb: row.total_data_kb,
            total_carbon_g: row.total_carbon_g,
            total_savings_g: row.total_savings_g,
            avg_carbon_intensity: row.avg_carbon_intensity,
        }
    }
}

/// Roll up one day of raw analytics into `gridaware_daily_summary`.
///
/// Returns `None` when the day is already summarized or saw no page views.
pub async fn generate_daily_summary(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Option<DailySummary>, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM gridaware_daily_summary WHERE date = $1)",
    )
    .bind(date)
    .fetch_one(pool)
    .await?;
    if exists {
        tracing::debug!(%date, "daily summary already present");
        return Ok(None);
    }

    let totals: PeriodSummary = sqlx::query_as::<_, TotalsRow>(
        "SELECT COALESCE(SUM(page_views), 0)::BIGINT AS total_page_views,
                COALESCE(SUM(data_transferred_kb), 0) AS total_data_kb,
                COALESCE(SUM(estimated_carbon_g), 0) AS total_carbon_g,
                COALESCE(SUM(savings_carbon_g), 0) AS total_savings_g,
                COALESCE(AVG(carbon_intensity), 0) AS avg_carbon_intensity
         FROM gridaware_analytics
         WHERE (recorded_at AT TIME ZONE 'UTC')::date = $1",
    )
    .bind(date)
    .fetch_one(pool)
    .await?
    .into();

    if totals.total_page_views <= 0 {
        tracing::debug!(%date, "no page views, skipping daily summary");
        return Ok(None);
    }

    let modes: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT mode FROM gridaware_analytics
         WHERE (recorded_at AT TIME ZONE 'UTC')::date = $1",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;
    let peak_mode = peak_mode(modes.iter().map(String::as_str));

    let inserted = sqlx::query(
        "INSERT INTO gridaware_daily_summary
            (date, total_page_views, total_data_kb, total_carbon_g, total_savings_g,
             avg_carbon_intensity, peak_mode)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (date) DO NOTHING",
    )
    .bind(date)
    .bind(totals.total_page_views)
    .bind(totals.total_data_kb)
    .bind(totals.total_carbon_g)
    .bind(totals.total_savings_g)
    .bind(totals.avg_carbon_intensity)
    .bind(peak_mode.as_str())
    .execute(pool)
    .await?
    .rows_affected();
    if !claimed(inserted) {
        tracing::debug!(%date, "daily summary written concurrently, skipping");
        return Ok(None);
    }

    tracing::info!(%date, page_views = totals.total_page_views, peak = %peak_mode, "daily summary written");
    Ok(Some(DailySummary { date, totals, peak_mode }))
}

/// Sum daily summaries over `from..=to`.
pub async fn period_summary(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<PeriodSummary, sqlx::Error> {
    let rows: Vec<TotalsRow> = sqlx::query_as(
        "SELECT total_page_views, total_data_kb, total_carbon_g, total_savings_g, avg_carbon_intensity
         FROM gridaware_daily_summary
         WHERE date BETWEEN $1 AND $2
         ORDER BY date",
    )
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;
    let days: Vec<PeriodSummary> = rows.into_iter().map(Into::into).collect();
    Ok(PeriodSummary::combine(&days))
}

/// A concurrent run may have inserted the row between the check and the insert.
fn claimed(rows_affected: u64) -> bool {
    rows_affected == 1
}

/// Most aggressive known mode; unknown labels are ignored.
fn peak_mode<'a>(labels: impl IntoIterator<Item = &'a str>) -> GridMode {
    labels
        .into_iter()
        .filter_map(GridMode::parse)
        .max_by_key(GridMode::rank)
        .unwrap_or_default()
}
