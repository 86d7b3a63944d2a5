use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate, TimeDelta, Utc};
use sqlx::PgPool;

use gridaware_carbon::CarbonCache;
use gridaware_carbon::http::{self, ElectricityMapsSource};
use gridaware_core::analytics::db::PgSink;
use gridaware_core::analytics::{GoalProgress, PageKind, PageProfile, WeekComparison, db};
use gridaware_core::config::GridAwareCfg;
use gridaware_core::connection::ConnectionInfo;
use gridaware_core::level::level_for;
use gridaware_core::resolver::{RequestContext, threshold_mode};
use gridaware_core::service::{GridAware, PageRequest};
use gridaware_core::session::SessionState;
use gridaware_core::test_cookie;
use gridaware_core::types::GridMode;

pub async fn status(cfg: &GridAwareCfg, zone: Option<String>) -> anyhow::Result<()> {
    let zone = zone.unwrap_or_else(|| cfg.zone.clone());
    let cache = CarbonCache::new(source_for(cfg));

    match cache.get_carbon_intensity(&zone).await {
        Ok(reading) => {
            let mode = threshold_mode(reading.intensity, cfg.enable_super_eco);
            println!("zone:        {}", reading.zone);
            println!("intensity:   {:.1} gCO2/kWh", reading.intensity);
            println!("mode:        {mode}");
            println!("valid until: {}", reading.valid_until.to_rfc3339());
        }
        Err(e) if e.is_configuration() => {
            return Err(anyhow!("{e}; set GRIDAWARE_API_KEY or the api_key setting"));
        }
        Err(e) => {
            tracing::warn!(zone = %zone, error = %e, "carbon intensity lookup failed");
            println!("zone:        {zone}");
            println!("intensity:   unavailable ({e})");
            println!("mode:        {}", GridMode::Standard);
        }
    }
    Ok(())
}

pub fn level(
    ect: String,
    downlink: Option<f64>,
    rtt: Option<u32>,
    save_data: bool,
    intensity: f64,
) -> anyhow::Result<()> {
    let connection = ConnectionInfo {
        effective_type: ect.to_ascii_lowercase(),
        downlink_mbps: downlink,
        rtt_ms: rtt,
        save_data,
    };
    println!("{}", level_for(&connection, intensity));
    Ok(())
}

pub fn sign_cookie(cfg: &GridAwareCfg, mode: &str, secret: Option<String>) -> anyhow::Result<()> {
    let mode = GridMode::parse(mode).ok_or_else(|| anyhow!("unknown mode {mode:?}"))?;
    let secret = secret.unwrap_or_else(|| cfg.test_cookie_secret.clone());
    let value = test_cookie::sign(mode, secret.as_bytes())?;
    println!("{}={value}", test_cookie::COOKIE_NAME);
    Ok(())
}

pub async fn summarize(pool: &PgPool, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive() - TimeDelta::days(1));
    match db::generate_daily_summary(pool, date).await.context("daily summary failed")? {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => println!("{date}: nothing to summarize"),
    }
    Ok(())
}

pub async fn report_week(pool: &PgPool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let current = db::period_summary(pool, today - TimeDelta::days(7), today - TimeDelta::days(1)).await?;
    let previous = db::period_summary(pool, today - TimeDelta::days(14), today - TimeDelta::days(8)).await?;
    let comparison = WeekComparison::between(&current, &previous);
    let assessment = comparison.assessment();

    let report = serde_json::json!({
        "current": current,
        "previous": previous,
        "changes": comparison,
        "assessment": assessment,
        "message": assessment.message(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn report_goal(pool: &PgPool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let month_start = today.with_day(1).unwrap_or(today);
    let month = db::period_summary(pool, month_start, today).await?;
    let progress = GoalProgress::monthly(month.total_savings_g);
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

pub async fn set(pool: &PgPool, key: &str, value: &str) -> anyhow::Result<()> {
    let stored = GridAwareCfg::set(pool, key, value).await?;
    tracing::info!(key, "setting updated");
    println!("{key} = {stored}");
    Ok(())
}

/// Options for resolving and recording a single page view.
pub struct PageArgs {
    pub kind: PageKind,
    pub content_bytes: usize,
    pub images: usize,
    pub connection: ConnectionInfo,
    pub admin: bool,
    pub preview: Option<String>,
}

/// Resolve one page view end to end. With a database the view is written
/// to `gridaware_analytics`, feeding `summarize` and `report`.
pub async fn page(cfg: &GridAwareCfg, pool: Option<&PgPool>, args: PageArgs) -> anyhow::Result<()> {
    let mut service = GridAware::new(cfg.clone(), source_for(cfg));
    match pool {
        Some(pool) => service = service.with_sink(Arc::new(PgSink::new(pool.clone()))),
        None => tracing::warn!("no database, page view will not be recorded"),
    }

    let mut ctx = if args.admin { RequestContext::admin() } else { RequestContext::visitor() };
    if let Some(preview) = args.preview {
        ctx = ctx.with_preview(preview);
    }
    let request = PageRequest {
        ctx,
        connection: args.connection,
        profile: PageProfile { kind: args.kind, content_bytes: args.content_bytes, image_count: args.images },
    };

    let mut session = SessionState::default();
    let outcome = service.handle_page(&request, &mut session).await;
    let recorded = match outcome.analytics {
        Some(handle) => {
            handle.await.context("analytics task failed")?;
            true
        }
        None => false,
    };

    let report = serde_json::json!({
        "decision": outcome.decision,
        "level": outcome.level,
        "plan": outcome.plan,
        "notice": outcome.notice.map(|n| n.message()),
        "body_class": outcome.decision.mode.css_class(),
        "recording_attempted": recorded,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn source_for(cfg: &GridAwareCfg) -> ElectricityMapsSource {
    http::from_env(&cfg.api_key, Duration::from_secs(cfg.api_timeout_secs))
}
