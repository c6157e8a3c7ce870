//! Attendance GW - Rust implementation
//!
//! Camera-driven attendance: barcodes and badge OCR in, one confirmed record per
//! student out, polled by the browser front-end over HTTP.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attendance_gw::api::{self, ApiState};
use attendance_gw::capture::{Collaborators, PhotoSink};
use attendance_gw::config::AppConfig;
use attendance_gw::roster::Roster;
use attendance_gw::session::SessionController;

/// Attendance Gateway - barcode + OCR attendance session coordinator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "attendance.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write daily rolling log files to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// API port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Do not start the camera at boot
    #[arg(long)]
    no_autostart: bool,

    /// Print the loaded roster and exit
    #[arg(long)]
    list_roster: bool,

    /// Show which roster name a piece of OCR text resolves to, then exit
    #[arg(long, value_name = "TEXT")]
    match_text: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    info!("Starting Attendance GW v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = AppConfig::load(&args.config).await?;
    if let Some(port) = args.port {
        config.server.port = port;
        config.validate()?;
    }

    let roster = config.load_roster().await?;
    info!("Roster loaded: {} student(s)", roster.len());

    if args.list_roster {
        print_roster(&roster);
        return Ok(());
    }

    if let Some(text) = &args.match_text {
        print_match(&roster, text);
        return Ok(());
    }

    let photos = if config.photos.enabled {
        Some(PhotoSink::spawn(
            &config.photos.dir,
            config.photos.queue_capacity,
        )?)
    } else {
        info!("Photo capture disabled");
        None
    };

    let collaborators = Collaborators::replay(
        &config.camera.replay_dir,
        config.camera.loop_replay,
        config.camera.jpeg_quality,
    );
    info!("Frame source: {}", config.camera.replay_dir.display());

    let controller = SessionController::new(
        roster,
        config.session_settings(),
        collaborators,
        photos,
    );

    if config.session.auto_start && !args.no_autostart {
        if let Err(e) = controller.start() {
            warn!("⚠️ Camera did not start: {}", e);
        }
    }

    let state = Arc::new(ApiState::new(controller.clone()));
    api::start_server(
        state,
        &config.server.host,
        config.server.port,
        shutdown_signal(),
    )
    .await?;

    // Joining the capture thread blocks
    tokio::task::spawn_blocking(move || controller.shutdown()).await?;

    info!("Attendance GW shutdown complete");
    Ok(())
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "attendance-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

fn print_roster(roster: &Roster) {
    use colored::*;

    println!("\n{}", "=== Class Roster ===".bold().cyan());
    println!("  Students: {}", roster.len().to_string().green());
    println!();

    for (idx, name) in roster.names().iter().enumerate() {
        if !roster.is_catch_all(idx) {
            println!("  {:>3}. {}", idx + 1, name);
        } else {
            println!(
                "  {:>3}. {} {}",
                idx + 1,
                name.yellow(),
                "(no token long enough, matches any text)".dimmed()
            );
        }
    }
    println!();
}

fn print_match(roster: &Roster, text: &str) {
    use colored::*;

    println!("\n{}", "=== OCR Match ===".bold().cyan());
    println!("  Text: {:?}", text);
    match roster.match_text(text) {
        Some(name) => println!("  Match: {}", name.green().bold()),
        None => println!(
            "  Match: {} (reads count towards the unknown threshold)",
            "none".red()
        ),
    }
    println!();
}
