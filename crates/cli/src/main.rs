mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::PgPool;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gridaware_core::analytics::PageKind;
use gridaware_core::config::GridAwareCfg;
use gridaware_core::connection::ConnectionInfo;

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[derive(Parser, Debug)]
#[command(name = "gridaware", about = "Grid-aware page optimization tools", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show current carbon intensity and the resulting grid mode.
    Status {
        /// Grid zone; defaults to the configured zone.
        #[arg(long)]
        zone: Option<String>,
    },
    /// Map connection quality and intensity to an optimization level.
    Level {
        #[arg(long, default_value = "4g")]
        ect: String,
        #[arg(long)]
        downlink: Option<f64>,
        #[arg(long)]
        rtt: Option<u32>,
        #[arg(long, default_value_t = false)]
        save_data: bool,
        #[arg(long)]
        intensity: f64,
    },
    /// Print a signed admin test-mode cookie value.
    SignCookie {
        mode: String,
        /// Signing secret; defaults to the configured `test_cookie_secret`.
        #[arg(long, env = "GRIDAWARE_TEST_COOKIE_SECRET")]
        secret: Option<String>,
    },
    /// Roll up one day of analytics (default: yesterday).
    Summarize {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print an analytics report.
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
    },
    /// Resolve one page view and record it when a database is available.
    Page {
        #[arg(long, value_enum, default_value = "single")]
        kind: PageKindArg,
        #[arg(long, default_value_t = 0)]
        content_bytes: usize,
        #[arg(long, default_value_t = 0)]
        images: usize,
        #[arg(long, default_value = "4g")]
        ect: String,
        #[arg(long)]
        downlink: Option<f64>,
        #[arg(long, default_value_t = false)]
        save_data: bool,
        /// Act as a site admin, enabling `--preview`.
        #[arg(long, default_value_t = false)]
        admin: bool,
        #[arg(long)]
        preview: Option<String>,
    },
    /// Persist a single configuration key.
    Set { key: String, value: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PageKindArg {
    Front,
    Single,
    Other,
}

impl From<PageKindArg> for PageKind {
    fn from(kind: PageKindArg) -> Self {
        match kind {
            PageKindArg::Front => PageKind::Front,
            PageKindArg::Single => PageKind::Single,
            PageKindArg::Other => PageKind::Other,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ReportKind {
    Week,
    Goal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let pool = connect().await;
    let cfg = match pool {
        Some(ref pool) => GridAwareCfg::load(pool).await?,
        None => GridAwareCfg::default(),
    };

    match cli.command {
        Command::Status { zone } => commands::status(&cfg, zone).await,
        Command::Level { ect, downlink, rtt, save_data, intensity } => {
            commands::level(ect, downlink, rtt, save_data, intensity)
        }
        Command::SignCookie { mode, secret } => commands::sign_cookie(&cfg, &mode, secret),
        Command::Summarize { date } => commands::summarize(require(&pool)?, date).await,
        Command::Report { kind: ReportKind::Week } => commands::report_week(require(&pool)?).await,
        Command::Report { kind: ReportKind::Goal } => commands::report_goal(require(&pool)?).await,
        Command::Page { kind, content_bytes, images, ect, downlink, save_data, admin, preview } => {
            let connection = ConnectionInfo {
                effective_type: ect.to_ascii_lowercase(),
                downlink_mbps: downlink,
                rtt_ms: None,
                save_data,
            };
            let args = commands::PageArgs { kind: kind.into(), content_bytes, images, connection, admin, preview };
            commands::page(&cfg, pool.as_ref(), args).await
        }
        Command::Set { key, value } => commands::set(require(&pool)?, &key, &value).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true).with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Connect and migrate when `DATABASE_URL` is set. Any failure leaves the
/// CLI in ephemeral mode with default settings.
async fn connect() -> Option<PgPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::debug!("DATABASE_URL not set, running without database");
            return None;
        }
    };

    let connect_result = tokio::time::timeout(
        std::time::Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        sqlx::postgres::PgPoolOptions::new().max_connections(4).connect(&url),
    )
    .await;

    match connect_result {
        Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
            Ok(()) => {
                tracing::info!("database connected and migrations applied");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database migration failed, running without database");
                None
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect DATABASE_URL, running without database");
            None
        }
        Err(_) => {
            tracing::warn!(timeout_secs = DB_CONNECT_TIMEOUT_SECS, "database connect timed out");
            None
        }
    }
}

fn require(pool: &Option<PgPool>) -> anyhow::Result<&PgPool> {
    pool.as_ref()
        .ok_or_else(|| anyhow::anyhow!("this command needs a reachable database (set DATABASE_URL)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn page_command_parses() {
        let cli = Cli::try_parse_from([
            "gridaware", "page", "--kind", "front", "--images", "3", "--admin", "--preview", "eco",
        ])
        .unwrap();
        match cli.command {
            Command::Page { kind, images, admin, preview, ect, .. } => {
                assert_eq!(PageKind::from(kind), PageKind::Front);
                assert_eq!(images, 3);
                assert!(admin);
                assert_eq!(preview.as_deref(), Some("eco"));
                assert_eq!(ect, "4g");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn report_kind_is_required() {
        assert!(Cli::try_parse_from(["gridaware", "report"]).is_err());
        assert!(Cli::try_parse_from(["gridaware", "report", "week", "--json"]).is_ok());
    }
}
