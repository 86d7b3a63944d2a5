use serde::{Deserialize, Serialize};

use crate::types::GridMode;

/// Energy per transferred kilobyte, kWh.
pub const KWH_PER_KB: f64 = 0.000006;

const BASE_PAGE_KB: f64 = 500.0;
const FRONT_PAGE_EXTRA_KB: f64 = 800.0;
const SINGLE_PAGE_EXTRA_KB: f64 = 300.0;
const IMAGE_KB: f64 = 150.0;

/// Kind of page being rendered, for size estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Front,
    Single,
    Other,
}

/// What we know about a page before estimating its transfer size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProfile {
    pub kind: PageKind,
    pub content_bytes: usize,
    pub image_count: usize,
}

impl PageProfile {
    /// Profile a page from its main content body.
    pub fn from_content(kind: PageKind, content: &str) -> Self {
        Self {
            kind,
            content_bytes: content.len(),
            image_count: content.matches("<img").count(),
        }
    }

    /// Estimated unoptimized transfer size, KB.
    pub fn baseline_kb(&self) -> f64 {
        let extra = match self.kind {
            PageKind::Front => FRONT_PAGE_EXTRA_KB,
            PageKind::Single => SINGLE_PAGE_EXTRA_KB,
            PageKind::Other => 0.0,
        };
        BASE_PAGE_KB + extra + self.content_bytes as f64 / 1024.0 + self.image_count as f64 * IMAGE_KB
    }
}

/// Share of the baseline still transferred in `mode`.
pub fn reduction_factor(mode: GridMode) -> f64 {
    match mode {
        GridMode::Standard => 1.0,
        GridMode::Eco => 0.75,
        GridMode::SuperEco => 0.50,
    }
}

/// Grams of CO2 for transferring `kb` at `intensity` gCO2/kWh.
pub fn carbon_grams(kb: f64, intensity: f64) -> f64 {
    kb * KWH_PER_KB * intensity
}

/// Estimated footprint of one page view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageEstimate {
    pub baseline_kb: f64,
    pub data_kb: f64,
    pub carbon_g: f64,
    pub savings_g: f64,
}

pub fn estimate_page(profile: &PageProfile, mode: GridMode, intensity: f64) -> PageEstimate {
    let baseline_kb = profile.baseline_kb();
    let data_kb = baseline_kb * reduction_factor(mode);
    let carbon_g = carbon_grams(data_kb, intensity);
    let savings_g = (carbon_grams(baseline_kb, intensity) - carbon_g).max(0.0);
    PageEstimate { baseline_kb, data_kb, carbon_g, savings_g }
}

/// A single optimization applied to content, reported separately from page views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    ImageCompression,
    ScriptDeferring,
    LazyLoading,
    VideoOptimization,
    TinyPlaceholders,
}

impl OptimizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageCompression => "image_compression",
            Self::ScriptDeferring => "script_deferring",
            Self::LazyLoading => "lazy_loading",
            Self::VideoOptimization => "video_optimization",
            Self::TinyPlaceholders => "tiny_placeholders",
        }
    }

    /// Typical KB avoided when the caller has no measured figure.
    pub fn default_saved_kb(&self) -> f64 {
        match self {
            Self::ImageCompression => 0.0,
            Self::ScriptDeferring => 50.0,
            Self::LazyLoading => 100.0,
            Self::VideoOptimization => 500.0,
            Self::TinyPlaceholders => 75.0,
        }
    }

    /// `(data_saved_kb, carbon_saved_g)`; `measured_kb` overrides the default.
    pub fn savings(&self, measured_kb: Option<f64>, intensity: f64) -> (f64, f64) {
        let kb = measured_kb.unwrap_or_else(|| self.default_saved_kb());
        (kb, carbon_grams(kb, intensity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn baseline_by_kind() {
        let other = PageProfile { kind: PageKind::Other, content_bytes: 0, image_count: 0 };
        assert!(approx(other.baseline_kb(), 500.0));
        let front = PageProfile { kind: PageKind::Front, content_bytes: 2048, image_count: 2 };
        assert!(approx(front.baseline_kb(), 500.0 + 800.0 + 2.0 + 300.0));
    }

    #[test]
    fn profile_counts_images() {
        let p = PageProfile::from_content(PageKind::Single, "<p>a</p><img src=x><img src=y>");
        assert_eq!(p.image_count, 2);
        assert_eq!(p.content_bytes, 30);
    }

    #[test]
    fn standard_mode_saves_nothing() {
        let p = PageProfile { kind: PageKind::Other, content_bytes: 0, image_count: 0 };
        let e = estimate_page(&p, GridMode::Standard, 300.0);
        assert!(approx(e.data_kb, 500.0));
        assert!(approx(e.carbon_g, 500.0 * KWH_PER_KB * 300.0));
        assert!(approx(e.savings_g, 0.0));
    }

    #[test]
    fn super_eco_halves_transfer() {
        let p = PageProfile { kind: PageKind::Other, content_bytes: 0, image_count: 0 };
        let e = estimate_page(&p, GridMode::SuperEco, 400.0);
        assert!(approx(e.data_kb, 250.0));
        assert!(approx(e.savings_g, e.carbon_g));
    }

    #[test]
    fn optimization_savings() {
        let (kb, g) = OptimizationKind::VideoOptimization.savings(None, 200.0);
        assert!(approx(kb, 500.0));
        assert!(approx(g, 500.0 * KWH_PER_KB * 200.0));
        let (kb, _) = OptimizationKind::ImageCompression.savings(Some(42.0), 200.0);
        assert!(approx(kb, 42.0));
    }
}
