use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::GridMode;

/// Per-visitor state carried between requests.
///
/// The web layer owns persistence (cookie, session store); the resolver only
/// reads and writes this struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Last measured intensity, gCO2/kWh.
    pub intensity: Option<f64>,
    /// When `intensity` stops being reusable.
    pub expires: Option<DateTime<Utc>>,
    /// Last resolved mode.
    pub mode: Option<GridMode>,
    /// Set while an admin override produced `mode`.
    #[serde(default)]
    pub forced: bool,
}

impl SessionState {
    /// Stored intensity if it has not expired at `now`.
    pub fn fresh_intensity(&self, now: DateTime<Utc>) -> Option<f64> {
        match (self.intensity, self.expires) {
            (Some(intensity), Some(expires)) if now < expires => Some(intensity),
            _ => None,
        }
    }

    pub fn store_measurement(&mut self, intensity: f64, expires: DateTime<Utc>) {
        self.intensity = Some(intensity);
        self.expires = Some(expires);
    }

    /// Last-known mode, `standard` when nothing was resolved yet.
    pub fn last_mode(&self) -> GridMode {
        self.mode.unwrap_or_default()
    }

    /// Epoch seconds of `expires`, for stores that keep plain integers.
    pub fn expires_epoch(&self) -> Option<i64> {
        self.expires.map(|e| e.timestamp())
    }
}
