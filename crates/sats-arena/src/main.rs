//! sats-arena - daily Bitcoin prize-pool competition server
//!
//! ## Usage
//!
//! ```text
//! sats-arena run                    # Run the server
//! sats-arena new-db                 # Create a new database
//! sats-arena upgrade-db             # Apply pending schema migrations
//! sats-arena sample-config          # Print a sample configuration file
//! sats-arena info                   # Print configuration summary
//! ```
//!
//! Configuration comes from a TOML file (`--config`) with `SATS_ARENA_*`
//! environment overrides.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use arena_app::{logging, App, AppConfig, LogConfig, LogFormat};

/// Daily Bitcoin prize-pool competition server
#[derive(Parser)]
#[command(name = "sats-arena")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, default_value = "text", global = true)]
    log_format: CliLogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliLogFormat {
    #[default]
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server
    Run,

    /// Create a new database
    NewDb {
        /// Path to the database file (overrides config)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Apply pending schema migrations
    UpgradeDb,

    /// Print a sample configuration file
    SampleConfig,

    /// Print configuration summary
    Info,
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file_with_env(path)?,
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
        }
    };

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    config.logging.format = match cli.log_format {
        CliLogFormat::Text => "text".to_string(),
        CliLogFormat::Json => "json".to_string(),
    };
    Ok(config)
}

fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let log_config = match config.logging.format.as_str() {
        "json" => LogConfig::json(),
        _ => LogConfig::default(),
    }
    .with_level(&config.logging.level);
    logging::init(&log_config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run => {
            init_logging(&config)?;
            let app = App::new(config)?;
            app.run().await
        }
        Commands::NewDb { path } => {
            init_logging(&config)?;
            let db_path = path.unwrap_or_else(|| config.database.path.clone());
            let _db = arena_db::Database::open(&db_path)?;
            tracing::info!(path = ?db_path, "Database created");
            Ok(())
        }
        Commands::UpgradeDb => {
            init_logging(&config)?;
            let db = arena_db::Database::open(&config.database.path)?;
            db.with_conn(arena_db::migrations::run_migrations)?;
            tracing::info!(path = ?config.database.path, "Database up to date");
            Ok(())
        }
        Commands::SampleConfig => {
            println!("{}", AppConfig::sample_config());
            Ok(())
        }
        Commands::Info => {
            println!("environment: {:?}", config.environment);
            println!("database:    {}", config.database.path.display());
            println!(
                "server:      {}:{}",
                config.server.address, config.server.port
            );
            println!("lnbits:      {}", config.lnbits.url);
            println!(
                "payouts:     {}",
                if config.lnbits.admin_key.is_some() {
                    "configured"
                } else {
                    "disabled"
                }
            );
            println!("attempt_usd: {}", config.game.attempt_cost_usd);
            Ok(())
        }
    }
}
