use serde::{Deserialize, Serialize};
use std::fmt;

/// Intensity (gCO2/kWh) at or above which eco mode applies.
pub const ECO_THRESHOLD: f64 = 200.0;
/// Intensity (gCO2/kWh) at or above which super-eco mode applies, when enabled.
pub const SUPER_ECO_THRESHOLD: f64 = 350.0;
/// Stand-in intensity when no reading is available (analytics, level mapping).
pub const DEFAULT_INTENSITY: f64 = 250.0;

// ── Grid mode ──────────────────────────────────────────────────

/// Operating mode applied to a page render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridMode {
    #[default]
    Standard,
    Eco,
    SuperEco,
}

impl GridMode {
    pub const ALL: [GridMode; 3] = [Self::Standard, Self::Eco, Self::SuperEco];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Eco => "eco",
            Self::SuperEco => "super-eco",
        }
    }

    /// Parse a mode name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "eco" => Some(Self::Eco),
            "super-eco" => Some(Self::SuperEco),
            _ => None,
        }
    }

    /// Body class downstream templates attach for CSS targeting.
    pub fn css_class(&self) -> String {
        format!("grid-aware-mode-{}", self.as_str())
    }

    /// Rank used when picking the peak mode of a period (standard < eco < super-eco).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Standard => 1,
            Self::Eco => 2,
            Self::SuperEco => 3,
        }
    }

    pub fn is_eco(&self) -> bool {
        !matches!(self, Self::Standard)
    }
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`ModeDecision`] came from. Surfaced to admins only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeSource {
    Measured,
    ForcedSetting,
    ForcedPreview,
    TestCookie,
}

impl ModeSource {
    pub fn is_override(&self) -> bool {
        !matches!(self, Self::Measured)
    }
}

/// Resolved mode for one request.
///
/// For `Measured` decisions `mode` is a pure function of the intensity and the
/// super-eco flag. Override decisions carry a synthetic intensity for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeDecision {
    pub mode: GridMode,
    pub intensity: Option<f64>,
    pub source: ModeSource,
}

impl ModeDecision {
    pub fn measured(mode: GridMode, intensity: Option<f64>) -> Self {
        Self { mode, intensity, source: ModeSource::Measured }
    }

    /// Intensity to feed into estimates, falling back to [`DEFAULT_INTENSITY`].
    pub fn intensity_or_default(&self) -> f64 {
        self.intensity.unwrap_or(DEFAULT_INTENSITY)
    }
}

// ── Optimization level ─────────────────────────────────────────

/// Image-serving aggressiveness. Ordered: minimal < medium < aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    Minimal,
    Medium,
    Aggressive,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Medium => "medium",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
