use clap::Parser;
use cobranca_engine::{
    cli::{self, Cli},
    config::{database, settings},
    errors::Result,
};
use dotenvy::dotenv;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Initialize tracing (as early as possible)
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // 2. Load .env file, env vars can be set externally
    dotenv().ok();
    debug!("Attempted to load .env file.");

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, code = e.exit_code(), "command failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = settings::load_settings_or_default(&cli.config)
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    info!(config = %cli.config.display(), "settings loaded");

    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;

    cli::execute(&cli.command, &settings, &db).await
}
