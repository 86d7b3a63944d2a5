use serde::Serialize;

use crate::config::GridAwareCfg;
use crate::types::GridMode;

/// How `<img>` content should be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStrategy {
    /// Leave images untouched.
    Original,
    /// Add `loading="lazy"`.
    LazyLoad,
    /// Serve a tiny blurred placeholder, swap in the full image later.
    TinyPlaceholder,
    /// Replace the image with a box showing its alt text.
    AltText,
}

/// Content optimizations a renderer should apply for the resolved mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationPlan {
    pub mode: GridMode,
    pub images: ImageStrategy,
    pub defer_assets: bool,
    /// Hide iframes behind click-to-load placeholders.
    pub hide_embeds: bool,
    /// Wrap video embeds in click-to-load placeholders.
    pub video_placeholders: bool,
    essential_scripts: Vec<String>,
    essential_styles: Vec<String>,
}

impl OptimizationPlan {
    /// Build the plan. Standard mode applies nothing.
    pub fn for_mode(mode: GridMode, cfg: &GridAwareCfg) -> Self {
        let mut plan = Self {
            mode,
            images: ImageStrategy::Original,
            defer_assets: false,
            hide_embeds: false,
            video_placeholders: false,
            essential_scripts: owned(cfg.essential_script_handles()),
            essential_styles: owned(cfg.essential_style_handles()),
        };
        if !mode.is_eco() {
            return plan;
        }

        if cfg.optimize_images {
            // alt-text boxes win over placeholders when both cover the mode
            plan.images = if cfg.alt_text_mode.covers(mode) {
                ImageStrategy::AltText
            } else if cfg.tiny_placeholders && cfg.tiny_placeholders_mode.covers(mode) {
                ImageStrategy::TinyPlaceholder
            } else if cfg.lazy_load {
                ImageStrategy::LazyLoad
            } else {
                ImageStrategy::Original
            };
        }

        plan.defer_assets = cfg.defer_non_essential;

        if mode == GridMode::SuperEco {
            plan.hide_embeds = cfg.text_only_mode;
            plan.video_placeholders = cfg.optimize_video;
        }
        plan
    }

    pub fn is_noop(&self) -> bool {
        self.images == ImageStrategy::Original
            && !self.defer_assets
            && !self.hide_embeds
            && !self.video_placeholders
    }

    /// Whether a registered script handle should be deferred.
    /// Module scripts are never deferred.
    pub fn should_defer_script(&self, handle: &str, is_module: bool) -> bool {
        self.defer_assets && !is_module && !self.essential_scripts.iter().any(|h| h == handle)
    }

    /// Whether a stylesheet handle should load non-blocking.
    pub fn should_defer_style(&self, handle: &str) -> bool {
        self.defer_assets && !self.essential_styles.iter().any(|h| h == handle)
    }

    /// Action names recorded with analytics for this page.
    pub fn applied_actions(&self) -> Vec<&'static str> {
        let mut actions = Vec::new();
        match self.images {
            ImageStrategy::Original => {}
            ImageStrategy::LazyLoad => actions.push("lazy_loading"),
            ImageStrategy::TinyPlaceholder => {
                actions.push("image_optimization");
                actions.push("tiny_placeholders");
            }
            ImageStrategy::AltText => actions.push("image_optimization"),
        }
        if self.defer_assets {
            actions.push("script_deferring");
        }
        if self.video_placeholders {
            actions.push("video_optimization");
        }
        actions
    }
}

fn owned(handles: Vec<&str>) -> Vec<String> {
    handles.into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeScope;

    #[test]
    fn standard_mode_is_noop() {
        let plan = OptimizationPlan::for_mode(GridMode::Standard, &GridAwareCfg::default());
        assert!(plan.is_noop());
        assert!(plan.applied_actions().is_empty());
        assert!(!plan.should_defer_script("analytics", false));
    }

    #[test]
    fn eco_defaults_lazy_load_and_defer() {
        let plan = OptimizationPlan::for_mode(GridMode::Eco, &GridAwareCfg::default());
        assert_eq!(plan.images, ImageStrategy::LazyLoad);
        assert!(plan.defer_assets);
        assert!(!plan.video_placeholders);
        assert_eq!(plan.applied_actions(), vec!["lazy_loading", "script_deferring"]);
    }

    #[test]
    fn super_eco_defaults_placeholders_and_video() {
        let plan = OptimizationPlan::for_mode(GridMode::SuperEco, &GridAwareCfg::default());
        assert_eq!(plan.images, ImageStrategy::TinyPlaceholder);
        assert!(plan.video_placeholders);
        assert!(!plan.hide_embeds);
        assert_eq!(
            plan.applied_actions(),
            vec!["image_optimization", "tiny_placeholders", "script_deferring", "video_optimization"]
        );
    }

    #[test]
    fn alt_text_beats_placeholders() {
        let cfg = GridAwareCfg {
            alt_text_mode: ModeScope::EcoAndSuperEco,
            tiny_placeholders_mode: ModeScope::EcoAndSuperEco,
            ..Default::default()
        };
        assert_eq!(OptimizationPlan::for_mode(GridMode::Eco, &cfg).images, ImageStrategy::AltText);
        assert_eq!(OptimizationPlan::for_mode(GridMode::SuperEco, &cfg).images, ImageStrategy::AltText);
    }

    #[test]
    fn alt_text_super_eco_only_leaves_eco_to_placeholders() {
        let cfg = GridAwareCfg {
            alt_text_mode: ModeScope::SuperEcoOnly,
            tiny_placeholders_mode: ModeScope::EcoAndSuperEco,
            ..Default::default()
        };
        assert_eq!(OptimizationPlan::for_mode(GridMode::Eco, &cfg).images, ImageStrategy::TinyPlaceholder);
    }

    #[test]
    fn images_disabled() {
        let cfg = GridAwareCfg { optimize_images: false, ..Default::default() };
        let plan = OptimizationPlan::for_mode(GridMode::SuperEco, &cfg);
        assert_eq!(plan.images, ImageStrategy::Original);
        assert!(plan.defer_assets);
    }

    #[test]
    fn text_only_applies_in_super_eco() {
        let cfg = GridAwareCfg { text_only_mode: true, ..Default::default() };
        assert!(OptimizationPlan::for_mode(GridMode::SuperEco, &cfg).hide_embeds);
        assert!(!OptimizationPlan::for_mode(GridMode::Eco, &cfg).hide_embeds);
    }

    #[test]
    fn essential_handles_are_not_deferred() {
        let cfg = GridAwareCfg {
            essential_scripts: "jquery, wp-embed".into(),
            essential_styles: "theme".into(),
            ..Default::default()
        };
        let plan = OptimizationPlan::for_mode(GridMode::Eco, &cfg);
        assert!(!plan.should_defer_script("jquery", false));
        assert!(!plan.should_defer_script("wp-embed", false));
        assert!(plan.should_defer_script("slider", false));
        assert!(!plan.should_defer_script("slider", true));
        assert!(!plan.should_defer_style("theme"));
        assert!(plan.should_defer_style("fonts"));
    }
}
