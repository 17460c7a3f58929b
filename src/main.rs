use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ia_upload_bot::archive::{
    HttpFetcher, IaClient, MetadataAssembler, StagingArea, UploadExecutor,
};
use ia_upload_bot::discord::{self, Handler};
use ia_upload_bot::{Config, UploadCommand, UploadLimits};

/// Discord bot that archives attachments to the Internet Archive.
#[derive(Parser)]
#[command(name = "ia-upload-bot", version, about)]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and serve slash commands (default)
    Run,
    /// Validate configuration and print it with secrets redacted
    CheckConfig,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    // A missing .env is normal; variables may come from the environment.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            config.validate()?;
            println!("{}", config.summary());
            Ok(())
        }
        Commands::Run => run(config),
    }
}

fn run(config: Config) -> Result<()> {
    config.validate()?;

    // The blocking client must be created and dropped outside the async runtime.
    let archive = Arc::new(IaClient::new(
        config.archive.credentials(),
        &config.archive.metadata_url,
        &config.archive.s3_url,
    )?);

    let staging = StagingArea::new(&config.upload.staging_dir)?;
    info!(staging_dir = %staging.base_dir().display(), "staging attachments locally");

    let upload = Arc::new(UploadCommand::new(
        staging,
        Arc::new(HttpFetcher::default()),
        UploadExecutor::new(archive.clone()),
        MetadataAssembler::new(&config.archive.scanner, &config.archive.collection),
        UploadLimits {
            max_attachments: config.upload.max_attachments,
            max_attachment_bytes: config.upload.max_attachment_bytes,
        },
        &config.archive.details_url,
    ));
    let handler = Handler::new(upload, &config.discord.activity);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(discord::run(&config.discord.token, handler));
    drop(runtime);
    drop(archive);
    result
}
