use std::sync::Arc;

use chrono::{DateTime, Utc};
use gridaware_carbon::{CarbonCache, IntensitySource};

use crate::config::ResolverConfig;
use crate::session::SessionState;
use crate::test_cookie;
use crate::types::{ECO_THRESHOLD, GridMode, ModeDecision, ModeSource, SUPER_ECO_THRESHOLD};

/// Request inputs the resolver looks at besides config and session.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Caller may manage the site. Gates every override path.
    pub is_admin: bool,
    /// Raw value of the signed test-mode cookie.
    pub test_cookie: Option<String>,
    /// Raw value of the preview query parameter.
    pub preview: Option<String>,
}

impl RequestContext {
    pub fn visitor() -> Self {
        Self::default()
    }

    pub fn admin() -> Self {
        Self { is_admin: true, ..Self::default() }
    }

    pub fn with_test_cookie(mut self, value: impl Into<String>) -> Self {
        self.test_cookie = Some(value.into());
        self
    }

    pub fn with_preview(mut self, mode: impl Into<String>) -> Self {
        self.preview = Some(mode.into());
        self
    }
}

/// Mode for a measured intensity. Both bounds are inclusive.
pub fn threshold_mode(intensity: f64, super_eco_enabled: bool) -> GridMode {
    if intensity >= SUPER_ECO_THRESHOLD && super_eco_enabled {
        GridMode::SuperEco
    } else if intensity >= ECO_THRESHOLD {
        GridMode::Eco
    } else {
        GridMode::Standard
    }
}

/// Display intensity for a test-cookie override.
pub fn test_cookie_intensity(mode: GridMode) -> f64 {
    match mode {
        GridMode::Standard => 150.0,
        GridMode::Eco => 250.0,
        GridMode::SuperEco => 400.0,
    }
}

/// Display intensity for a forced (preview or setting) override.
pub fn forced_intensity(mode: GridMode) -> f64 {
    match mode {
        GridMode::Standard => ECO_THRESHOLD - 50.0,
        GridMode::Eco => ECO_THRESHOLD + 50.0,
        GridMode::SuperEco => SUPER_ECO_THRESHOLD + 50.0,
    }
}

/// Decides the grid mode for a request.
///
/// Priority: test cookie > preview parameter > forced setting (admins only),
/// then session-cached intensity, then a fresh lookup through the cache.
pub struct ModeResolver<S> {
    cache: Arc<CarbonCache<S>>,
    zone: String,
    cookie_secret: Vec<u8>,
}

impl<S: IntensitySource> ModeResolver<S> {
    pub fn new(cache: Arc<CarbonCache<S>>, zone: impl Into<String>, cookie_secret: impl Into<Vec<u8>>) -> Self {
        Self { cache, zone: zone.into(), cookie_secret: cookie_secret.into() }
    }

    pub fn cache(&self) -> &Arc<CarbonCache<S>> {
        &self.cache
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Resolve the mode at the current time.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        cfg: &ResolverConfig,
        session: &mut SessionState,
    ) -> ModeDecision {
        self.resolve_at(ctx, cfg, session, Utc::now()).await
    }

    /// Resolve the mode with an explicit clock. Never fails: lookup errors
    /// degrade to the session's last-known mode.
    pub async fn resolve_at(
        &self,
        ctx: &RequestContext,
        cfg: &ResolverConfig,
        session: &mut SessionState,
        now: DateTime<Utc>,
    ) -> ModeDecision {
        if let Some(decision) = self.override_for(ctx, cfg) {
            tracing::debug!(mode = %decision.mode, source = ?decision.source, "mode override applied");
            if decision.source != ModeSource::TestCookie {
                session.mode = Some(decision.mode);
                session.forced = true;
            }
            return decision;
        }

        let intensity = match session.fresh_intensity(now) {
            Some(intensity) => {
                tracing::debug!(intensity, "reusing session intensity");
                Some(intensity)
            }
            None => match self.cache.get_carbon_intensity_at(&self.zone, now).await {
                Ok(reading) => {
                    session.store_measurement(reading.intensity, reading.valid_until);
                    Some(reading.intensity)
                }
                Err(e) => {
                    tracing::warn!(zone = %self.zone, error = %e, "carbon intensity unavailable, keeping last-known mode");
                    None
                }
            },
        };

        let Some(intensity) = intensity else {
            // an override mode was never measured; do not carry it forward
            if session.forced {
                session.mode = None;
                session.forced = false;
            }
            return ModeDecision::measured(session.last_mode(), None);
        };

        let mode = threshold_mode(intensity, cfg.enable_super_eco);
        if session.mode != Some(mode) {
            tracing::info!(mode = %mode, intensity, "grid mode changed");
        }
        session.mode = Some(mode);
        session.forced = false;
        ModeDecision::measured(mode, Some(intensity))
    }

    /// Admin-only overrides in priority order. `None` for visitors.
    fn override_for(&self, ctx: &RequestContext, cfg: &ResolverConfig) -> Option<ModeDecision> {
        if !ctx.is_admin {
            return None;
        }

        if let Some(value) = ctx.test_cookie.as_deref() {
            match test_cookie::verify(value, &self.cookie_secret) {
                Ok(mode) => {
                    return Some(ModeDecision {
                        mode,
                        intensity: Some(test_cookie_intensity(mode)),
                        source: ModeSource::TestCookie,
                    });
                }
                Err(e) => tracing::debug!(error = %e, "ignoring test-mode cookie"),
            }
        }

        if let Some(mode) = ctx.preview.as_deref().and_then(GridMode::parse) {
            return Some(ModeDecision {
                mode,
                intensity: Some(forced_intensity(mode)),
                source: ModeSource::ForcedPreview,
            });
        }

        cfg.force_mode.pinned().map(|mode| ModeDecision {
            mode,
            intensity: Some(forced_intensity(mode)),
            source: ModeSource::ForcedSetting,
        })
    }
}
