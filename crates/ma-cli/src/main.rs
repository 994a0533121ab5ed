use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ma_cli::commands::replay::{self, ReplayOptions};
use ma_cli::commands::sessions;
use ma_cli::{Cli, Commands, Config};

/// Open the session database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<ma_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    ma_db::Database::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database at {}",
            config.database_path.display()
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so JSON output on stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();

    match command {
        Commands::Replay {
            files,
            latest,
            json,
            record,
            prices,
        } => {
            let mut db = if *record {
                Some(open_database(&config)?)
            } else {
                None
            };
            let options = ReplayOptions {
                json: *json,
                prices: *prices,
            };
            replay::run(&mut writer, &config, files, *latest, options, db.as_mut())?;
        }
        Commands::Sessions { json } => {
            let db = open_database(&config)?;
            sessions::run(&mut writer, &db, *json)?;
        }
    }

    Ok(())
}
