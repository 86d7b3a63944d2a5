use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::types::GridMode;

/// Persisted `force_mode` setting: `auto` or a pinned mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceMode {
    #[default]
    Auto,
    Pinned(GridMode),
}

impl ForceMode {
    pub fn pinned(&self) -> Option<GridMode> {
        match self {
            Self::Auto => None,
            Self::Pinned(mode) => Some(*mode),
        }
    }
}

impl FromStr for ForceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        GridMode::parse(s)
            .map(Self::Pinned)
            .ok_or_else(|| format!("unknown force mode: {s}"))
    }
}

impl fmt::Display for ForceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Pinned(mode) => f.write_str(mode.as_str()),
        }
    }
}

/// Which eco modes a feature (tiny placeholders, alt-text boxes) is active in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeScope {
    Disabled,
    SuperEcoOnly,
    EcoAndSuperEco,
}

impl ModeScope {
    pub fn covers(&self, mode: GridMode) -> bool {
        match self {
            Self::Disabled => false,
            Self::SuperEcoOnly => mode == GridMode::SuperEco,
            Self::EcoAndSuperEco => mode.is_eco(),
        }
    }
}

impl FromStr for ModeScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "disabled" => Ok(Self::Disabled),
            "super-eco-only" => Ok(Self::SuperEcoOnly),
            "eco-and-super-eco" | "all-eco-modes" => Ok(Self::EcoAndSuperEco),
            other => Err(format!("unknown mode scope: {other}")),
        }
    }
}

impl fmt::Display for ModeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::SuperEcoOnly => "super-eco-only",
            Self::EcoAndSuperEco => "eco-and-super-eco",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const FLAG_KEYS: &[&str] = &[
    "enable_super_eco",
    "optimize_images",
    "lazy_load",
    "tiny_placeholders",
    "defer_non_essential",
    "text_only_mode",
    "optimize_video",
];

/// Subset of settings the mode resolver reads, collected up front so
/// resolution does not consult the store mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub force_mode: ForceMode,
    pub enable_super_eco: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { force_mode: ForceMode::Auto, enable_super_eco: true }
    }
}

/// All grid-aware settings. Loaded from `gridaware_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridAwareCfg {
    // upstream
    pub api_key: String,
    pub zone: String,
    pub api_timeout_secs: u64,

    // mode resolution
    pub force_mode: ForceMode,
    pub enable_super_eco: bool,
    pub test_cookie_secret: String,

    // image handling
    pub optimize_images: bool,
    pub lazy_load: bool,
    pub tiny_placeholders: bool,
    pub tiny_placeholders_mode: ModeScope,
    pub alt_text_mode: ModeScope,

    // assets
    pub defer_non_essential: bool,
    pub essential_scripts: String,
    pub essential_styles: String,

    // super-eco extras
    pub text_only_mode: bool,
    pub optimize_video: bool,
}

impl Default for GridAwareCfg {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            zone: "SE".into(),
            api_timeout_secs: 5,
            force_mode: ForceMode::Auto,
            enable_super_eco: true,
            test_cookie_secret: String::new(),
            optimize_images: true,
            lazy_load: true,
            tiny_placeholders: true,
            tiny_placeholders_mode: ModeScope::SuperEcoOnly,
            alt_text_mode: ModeScope::Disabled,
            defer_non_essential: true,
            essential_scripts: "jquery".into(),
            essential_styles: String::new(),
            text_only_mode: false,
            optimize_video: true,
        }
    }
}

impl GridAwareCfg {
    /// Load config from `gridaware_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM gridaware_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `gridaware_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO gridaware_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Validate and persist a single setting. Returns the stored value.
    pub async fn set(pool: &PgPool, key: &str, value: &str) -> Result<String, ConfigError> {
        let value = Self::normalize_setting(key, value)?;
        sqlx::query(
            "INSERT INTO gridaware_config (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(&value)
        .execute(pool)
        .await?;
        Ok(value)
    }

    /// Check `value` against the type of `key` and return its canonical form.
    pub fn normalize_setting(key: &str, value: &str) -> Result<String, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            reason,
        };
        let known = Self::default().to_entries().iter().any(|(k, _, _)| *k == key);
        if !known {
            return Err(ConfigError::UnknownKey(key.to_owned()));
        }

        let trimmed = value.trim();
        if FLAG_KEYS.contains(&key) {
            return match trimmed.to_ascii_lowercase().as_str() {
                "yes" => Ok(yes_no(true)),
                "no" => Ok(yes_no(false)),
                _ => Err(invalid("expected yes or no".into())),
            };
        }
        match key {
            "api_timeout_secs" => match trimmed.parse::<u64>() {
                Ok(0) => Err(invalid("must be at least 1".into())),
                Ok(secs) => Ok(secs.to_string()),
                Err(e) => Err(invalid(e.to_string())),
            },
            "force_mode" => trimmed.parse::<ForceMode>().map(|m| m.to_string()).map_err(invalid),
            "tiny_placeholders_mode" | "alt_text_mode" => {
                trimmed.parse::<ModeScope>().map(|m| m.to_string()).map_err(invalid)
            }
            "zone" if trimmed.is_empty() => Err(invalid("zone cannot be empty".into())),
            "zone" => Ok(trimmed.to_owned()),
            _ => Ok(value.to_owned()),
        }
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            api_key: get_or(m, "api_key", d.api_key),
            zone: get_or(m, "zone", d.zone),
            api_timeout_secs: get_or(m, "api_timeout_secs", d.api_timeout_secs),
            force_mode: get_or(m, "force_mode", d.force_mode),
            enable_super_eco: get_flag(m, "enable_super_eco", d.enable_super_eco),
            test_cookie_secret: get_or(m, "test_cookie_secret", d.test_cookie_secret),
            optimize_images: get_flag(m, "optimize_images", d.optimize_images),
            lazy_load: get_flag(m, "lazy_load", d.lazy_load),
            tiny_placeholders: get_flag(m, "tiny_placeholders", d.tiny_placeholders),
            tiny_placeholders_mode: get_or(m, "tiny_placeholders_mode", d.tiny_placeholders_mode),
            alt_text_mode: get_or(m, "alt_text_mode", d.alt_text_mode),
            defer_non_essential: get_flag(m, "defer_non_essential", d.defer_non_essential),
            essential_scripts: get_or(m, "essential_scripts", d.essential_scripts),
            essential_styles: get_or(m, "essential_styles", d.essential_styles),
            text_only_mode: get_flag(m, "text_only_mode", d.text_only_mode),
            optimize_video: get_flag(m, "optimize_video", d.optimize_video),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("api_key", self.api_key.clone(), "Carbon intensity API key"),
            ("zone", self.zone.clone(), "Grid zone code"),
            ("api_timeout_secs", self.api_timeout_secs.to_string(), "Upstream request timeout seconds"),
            ("force_mode", self.force_mode.to_string(), "auto, standard, eco or super-eco (admins only)"),
            ("enable_super_eco", yes_no(self.enable_super_eco), "Allow super-eco mode"),
            ("test_cookie_secret", self.test_cookie_secret.clone(), "HMAC secret for admin test-mode cookies"),
            ("optimize_images", yes_no(self.optimize_images), "Optimize images in eco modes"),
            ("lazy_load", yes_no(self.lazy_load), "Lazy-load images"),
            ("tiny_placeholders", yes_no(self.tiny_placeholders), "Serve tiny image placeholders"),
            ("tiny_placeholders_mode", self.tiny_placeholders_mode.to_string(), "Modes using tiny placeholders"),
            ("alt_text_mode", self.alt_text_mode.to_string(), "Modes replacing images with alt text"),
            ("defer_non_essential", yes_no(self.defer_non_essential), "Defer non-essential scripts and styles"),
            ("essential_scripts", self.essential_scripts.clone(), "Comma-separated script handles never deferred"),
            ("essential_styles", self.essential_styles.clone(), "Comma-separated style handles never deferred"),
            ("text_only_mode", yes_no(self.text_only_mode), "Hide embeds in super-eco mode"),
            ("optimize_video", yes_no(self.optimize_video), "Click-to-load videos in super-eco mode"),
        ]
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            force_mode: self.force_mode,
            enable_super_eco: self.enable_super_eco,
        }
    }

    pub fn essential_script_handles(&self) -> Vec<&str> {
        split_handles(&self.essential_scripts)
    }

    pub fn essential_style_handles(&self) -> Vec<&str> {
        split_handles(&self.essential_styles)
    }
}

fn split_handles(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).filter(|h| !h.is_empty()).collect()
}

fn yes_no(flag: bool) -> String {
    let value = if flag { "yes" } else { "no" };
    value.to_owned()
}

fn get_or<T: FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Flags are stored as `yes`/`no`.
fn get_flag(map: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match map.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "yes" => true,
        Some(v) if v == "no" => false,
        _ => default,
    }
}
