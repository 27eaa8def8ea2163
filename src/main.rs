mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use persona_core::{AppConfig, CoreError, ErrorExt, ErrorReporter};
use persona_pipeline::PersonaPipeline;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "redditor_persona=info,reddit_client=info,llm_interface=info,persona_pipeline=info";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn prompt_for_profile() -> anyhow::Result<String> {
    print!("Enter a Reddit profile URL or username: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read the profile from stdin")?;
    Ok(line.trim().to_string())
}

async fn run(args: Args) -> anyhow::Result<PathBuf> {
    let mut config = AppConfig::from_env(args.config.as_deref()).map_err(CoreError::from)?;
    args.apply_to(&mut config.settings);
    config.settings.validate().map_err(CoreError::from)?;

    let input = match &args.profile {
        Some(profile) => profile.clone(),
        None => prompt_for_profile()?,
    };

    let pipeline = PersonaPipeline::from_config(&config)?;
    Ok(pipeline.run(&input).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Real environment variables win over .env
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    tracing::info!("Starting redditor-persona {}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(path) => {
            println!("Persona report saved to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<CoreError>() {
                Some(core) => {
                    ErrorReporter::new().report_error(core);
                    eprintln!("Error: {}", core.user_friendly_message());
                }
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}
