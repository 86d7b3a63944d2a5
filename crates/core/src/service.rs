use std::sync::Arc;

use chrono::{DateTime, Utc};
use gridaware_carbon::{CarbonCache, IntensitySource};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::analytics::{AnalyticsRecord, AnalyticsSink, PageProfile, estimate_page};
use crate::config::GridAwareCfg;
use crate::connection::ConnectionInfo;
use crate::level::level_for;
use crate::plan::OptimizationPlan;
use crate::resolver::{ModeResolver, RequestContext};
use crate::session::SessionState;
use crate::types::{GridMode, ModeDecision, ModeSource, OptimizationLevel};

/// Everything known about an incoming page request.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub ctx: RequestContext,
    pub connection: ConnectionInfo,
    pub profile: PageProfile,
}

/// Banner shown to admins while an override is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mode", rename_all = "snake_case")]
pub enum AdminNotice {
    ForcedSetting(GridMode),
    Preview(GridMode),
    TestCookie(GridMode),
}

impl AdminNotice {
    fn for_decision(ctx: &RequestContext, decision: &ModeDecision) -> Option<Self> {
        if !ctx.is_admin {
            return None;
        }
        match decision.source {
            ModeSource::Measured => None,
            ModeSource::ForcedSetting => Some(Self::ForcedSetting(decision.mode)),
            ModeSource::ForcedPreview => Some(Self::Preview(decision.mode)),
            ModeSource::TestCookie => Some(Self::TestCookie(decision.mode)),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::ForcedSetting(mode) => format!("Grid-aware mode is forced to {mode} in settings."),
            Self::Preview(mode) => format!("Previewing {mode} mode."),
            Self::TestCookie(mode) => format!("Test mode cookie active: {mode}."),
        }
    }
}

/// Result of handling one page request.
#[derive(Debug)]
pub struct PageOutcome {
    pub decision: ModeDecision,
    pub level: OptimizationLevel,
    pub plan: OptimizationPlan,
    pub notice: Option<AdminNotice>,
    /// Background analytics write, if one was started. Callers may drop it.
    pub analytics: Option<JoinHandle<()>>,
}

/// Request-scoped entry point: mode resolution, level mapping, content plan
/// and analytics for a single page render.
pub struct GridAware<S> {
    cfg: Arc<GridAwareCfg>,
    resolver: ModeResolver<S>,
    sink: Option<Arc<dyn AnalyticsSink>>,
}

impl<S: IntensitySource> GridAware<S> {
    pub fn new(cfg: GridAwareCfg, source: S) -> Self {
        Self::with_cache(cfg, Arc::new(CarbonCache::new(source)))
    }

    /// Build over a shared cache, e.g. one cache for several services.
    pub fn with_cache(cfg: GridAwareCfg, cache: Arc<CarbonCache<S>>) -> Self {
        let resolver = ModeResolver::new(cache, cfg.zone.clone(), cfg.test_cookie_secret.clone().into_bytes());
        Self { cfg: Arc::new(cfg), resolver, sink: None }
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &GridAwareCfg {
        &self.cfg
    }

    pub fn resolver(&self) -> &ModeResolver<S> {
        &self.resolver
    }

    pub async fn handle_page(&self, request: &PageRequest, session: &mut SessionState) -> PageOutcome {
        self.handle_page_at(request, session, Utc::now()).await
    }

    pub async fn handle_page_at(
        &self,
        request: &PageRequest,
        session: &mut SessionState,
        now: DateTime<Utc>,
    ) -> PageOutcome {
        let decision = self
            .resolver
            .resolve_at(&request.ctx, &self.cfg.resolver_config(), session, now)
            .await;
        let intensity = decision.intensity_or_default();
        let level = level_for(&request.connection, intensity);
        let plan = OptimizationPlan::for_mode(decision.mode, &self.cfg);
        let notice = AdminNotice::for_decision(&request.ctx, &decision);

        // admin traffic is not counted
        let analytics = match &self.sink {
            Some(sink) if !request.ctx.is_admin => {
                let estimate = estimate_page(&request.profile, decision.mode, intensity);
                let record = AnalyticsRecord::page_view(
                    now,
                    decision.mode,
                    intensity,
                    self.resolver.zone(),
                    &estimate,
                    &plan.applied_actions(),
                );
                Some(spawn_record(Arc::clone(sink), record))
            }
            _ => None,
        };

        tracing::debug!(mode = %decision.mode, level = %level, "page handled");
        PageOutcome { decision, level, plan, notice, analytics }
    }

    /// Switch the grid zone. The previous zone's cached reading is dropped.
    pub async fn set_zone(&mut self, zone: impl Into<String>) {
        let zone = zone.into();
        let old = self.resolver.zone().to_owned();
        if old == zone {
            return;
        }
        self.resolver.cache().invalidate(&old).await;
        self.resolver = ModeResolver::new(
            Arc::clone(self.resolver.cache()),
            zone.clone(),
            self.cfg.test_cookie_secret.clone().into_bytes(),
        );
        tracing::info!(from = %old, to = %zone, "grid zone changed");
        Arc::make_mut(&mut self.cfg).zone = zone;
    }
}

fn spawn_record(sink: Arc<dyn AnalyticsSink>, record: AnalyticsRecord) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            tracing::warn!(sink = sink.name(), error = %e, "analytics record dropped");
        }
    })
}
