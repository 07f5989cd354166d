use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use daily_clip_uploader::config::create_default_config;
use daily_clip_uploader::{
    logging, AppContext, CommandFallback, Config, CredentialManager, DayGroups, FfmpegMerger,
    UploadOrchestrator, UploadedLedger, YouTubeTransport,
};

fn cli() -> Command {
    Command::new("Daily Clip Uploader")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Merge each day's recorded clips and upload them to YouTube")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("run").about("Upload all pending clips (default)"))
        .subcommand(Command::new("pending").about("List pending day-groups without uploading"))
        .subcommand(Command::new("auth").about("Authorize with YouTube and store credentials"))
        .subcommand(
            Command::new("init-config")
                .about("Write a default configuration file")
                .arg(
                    Arg::new("path")
                        .value_name("PATH")
                        .default_value("clip-uploader.toml"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show metadata of an uploaded video")
                .arg(Arg::new("video-id").value_name("VIDEO_ID").required(true)),
        )
        .subcommand(
            Command::new("probe")
                .about("Show ffprobe information for a clip")
                .arg(Arg::new("file").value_name("FILE").required(true)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    if let Some(("init-config", sub)) = matches.subcommand() {
        let path = PathBuf::from(
            sub.get_one::<String>("path")
                .map(String::as_str)
                .unwrap_or("clip-uploader.toml"),
        );
        create_default_config(&path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    logging::init(&config.logging, matches.get_flag("verbose"))?;

    info!("🚀 Daily Clip Uploader starting...");
    let ctx = AppContext::new(config);

    match matches.subcommand() {
        Some(("pending", _)) => pending(&ctx).await,
        Some(("auth", _)) => authorize(&ctx).await,
        Some(("info", sub)) => {
            let video_id = sub.get_one::<String>("video-id").context("video id is required")?;
            info_command(&ctx, video_id).await
        }
        Some(("probe", sub)) => {
            let file = sub.get_one::<String>("file").context("file is required")?;
            probe(&ctx, Path::new(file)).await
        }
        _ => run(&ctx).await,
    }
}

/// Production wiring shared by `run` and `pending`
async fn build_orchestrator(ctx: &AppContext, merger: FfmpegMerger) -> Result<UploadOrchestrator> {
    let credentials = Arc::new(CredentialManager::from_context(ctx));
    let transport = YouTubeTransport::from_context(ctx, credentials)?;
    let fallback = CommandFallback::from_context(ctx);
    let ledger = UploadedLedger::load(ctx.config.paths.ledger_file.clone()).await;

    Ok(UploadOrchestrator::new(
        ctx.clone(),
        Arc::new(merger),
        Arc::new(transport),
        Arc::new(fallback),
        ledger,
    ))
}

async fn run(ctx: &AppContext) -> Result<()> {
    ctx.config.validate()?;
    info!("{}", ctx.config.summary());

    let merger = FfmpegMerger::from_context(ctx);
    merger.check_available().await?;

    let mut orchestrator = build_orchestrator(ctx, merger).await?;
    let summary = orchestrator.run().await?;

    info!("✅ Successful: {}", summary.successful_uploads);
    info!("❌ Failed: {}", summary.failed_uploads);
    info!(
        "📊 Single videos: {}, merged videos: {}",
        summary.single_videos, summary.merged_videos
    );
    println!("{}", summary);

    Ok(())
}

async fn pending(ctx: &AppContext) -> Result<()> {
    let orchestrator = build_orchestrator(ctx, FfmpegMerger::from_context(ctx)).await?;
    let groups = orchestrator.pending()?;

    if groups.is_empty() {
        println!("No pending clips in {}", ctx.config.paths.video_dir.display());
        return Ok(());
    }

    print!("{}", format_pending(&groups, &ctx.config.upload.date_format));
    Ok(())
}

/// One header line per day-group, then its clips in upload order
fn format_pending(groups: &DayGroups, date_format: &str) -> String {
    let mut listing = String::new();

    for (date, files) in groups {
        let strategy = if files.len() == 1 { "single" } else { "merge" };
        listing.push_str(&format!(
            "{} ({} clips, {})\n",
            date.format(date_format),
            files.len(),
            strategy
        ));
        for file in files {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            listing.push_str(&format!("  {}\n", name));
        }
    }

    listing
}

async fn authorize(ctx: &AppContext) -> Result<()> {
    let manager = CredentialManager::from_context(ctx);

    match manager.ensure_valid().await {
        Ok(record) => {
            match record.seconds_until_expiry() {
                Some(secs) => println!("✅ Authorized, access token valid for {}s", secs),
                None => println!("✅ Authorized"),
            }
            println!("Credentials stored at {}", manager.credentials_path().display());
            Ok(())
        }
        Err(e) => {
            error!("Authorization failed");
            eprintln!("{}", e);
            Err(e.into())
        }
    }
}

async fn info_command(ctx: &AppContext, video_id: &str) -> Result<()> {
    let credentials = Arc::new(CredentialManager::from_context(ctx));
    let transport = YouTubeTransport::from_context(ctx, credentials)?;

    let video = transport.video_info(video_id).await?;
    println!("{}", serde_json::to_string_pretty(&video)?);
    Ok(())
}

async fn probe(ctx: &AppContext, file: &Path) -> Result<()> {
    let merger = FfmpegMerger::from_context(ctx);
    let info = merger.probe(file).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
