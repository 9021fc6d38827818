//! Command-line interface.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::TargetDate;

#[derive(Parser, Debug)]
#[command(name = "tdfetch")]
#[command(about = "Fetch daily Time Doctor reports through a browser session", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (JSON or TOML); auto-discovered when omitted.
    #[arg(long, global = true, env = "TDFETCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory (cache lives under it unless configured otherwise).
    #[arg(long, global = true, env = "TDFETCH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Resolve relative config paths against the current directory.
    #[arg(long, global = true)]
    pub cwd: bool,

    /// Show the browser window.
    #[arg(long, global = true)]
    pub headed: bool,

    /// Neither read nor write the report cache.
    #[arg(long, global = true)]
    pub no_cache: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the report for one date
    Fetch {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: TargetDate,
        /// Write `<date>.html` here instead of printing JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch every date in an inclusive range in one session
    Range {
        /// First date (YYYY-MM-DD)
        #[arg(long)]
        start: TargetDate,
        /// Last date (YYYY-MM-DD)
        #[arg(long)]
        end: TargetDate,
        /// Write one `<date>.html` per day here instead of printing JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify the configured credentials
    CheckLogin {
        /// Save a screenshot here if the login is rejected
        #[arg(long)]
        screenshot: Option<PathBuf>,
    },
    /// Inspect the report cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Print (or save) the cached report for a date
    Get {
        date: TargetDate,
        /// Write the HTML to this file
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so JSON on stdout stays clean.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings_with_options(LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data_dir: cli.data_dir,
        headless: cli.headed.then_some(false),
        no_cache: cli.no_cache,
    })
    .await?;

    init_tracing(&settings.log_level);
    settings.ensure_directories()?;

    match cli.command {
        Commands::Fetch { date, out } => commands::fetch::cmd_fetch(&settings, date, out).await,
        Commands::Range { start, end, out } => {
            commands::fetch::cmd_range(&settings, start, end, out).await
        }
        Commands::CheckLogin { screenshot } => {
            commands::login::cmd_check_login(&settings, screenshot).await
        }
        Commands::Cache { action } => match action {
            CacheAction::Get { date, out } => commands::cache::cmd_cache_get(&settings, date, out).await,
        },
    }
}
