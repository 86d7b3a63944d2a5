//! Grid-aware page optimization: decides how aggressively to slim a page
//! from the carbon intensity of the visitor's electricity grid.

pub mod analytics;
pub mod config;
pub mod connection;
pub mod level;
pub mod plan;
pub mod resolver;
pub mod service;
pub mod session;
pub mod test_cookie;
pub mod types;

pub use config::{ConfigError, ForceMode, GridAwareCfg, ModeScope, ResolverConfig};
pub use connection::ConnectionInfo;
pub use plan::{ImageStrategy, OptimizationPlan};
pub use resolver::{ModeResolver, RequestContext};
pub use service::{AdminNotice, GridAware, PageOutcome, PageRequest};
pub use session::SessionState;
pub use types::{GridMode, ModeDecision, ModeSource, OptimizationLevel};
