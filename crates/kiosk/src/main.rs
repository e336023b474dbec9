//! Attendance Kiosk - Main Entry Point

use camera_capture::{Camera, MockCamera, ReplayCamera};
use capture_scheduler::CancelToken;
use capture_session::{SessionConfig, SessionOrchestrator};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kiosk::{attend, display, improve, init_logging, register, KioskConfig, KioskError};
use recognition_client::{HttpRecognitionClient, MockRecognitionService, RecognitionService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kiosk")]
#[command(about = "Face registration and attendance capture kiosk")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./kiosk.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the in-process camera and recognition service with quick timings
    #[arg(long)]
    mock: bool,

    /// Replay still images from this directory as the camera
    #[arg(long)]
    camera_dir: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a registration sequence and enroll a student
    Register {
        name: String,
        student_id: String,
        /// Resubmit after server failures this many times
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Capture more images for an enrolled student to improve recognition
    Improve {
        student_id: String,
        /// Resubmit after server failures this many times
        #[arg(long, default_value = "0")]
        retries: u32,
    },
    /// Take attendance probes and show the ledger
    Attend {
        /// Number of probes to take
        #[arg(short = 'n', long, default_value = "1")]
        count: u32,
    },
    /// Check the recognition server
    Health,
    /// List enrolled students
    Students,
    /// Show recognition model statistics
    Stats,
    /// Show the server's attendance record for a day (YYYY-MM-DD)
    History { date: NaiveDate },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.json_logs, cli.verbose) {
        eprintln!("{}", e);
    }

    info!("=== Attendance Kiosk v{} ===", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), KioskError> {
    let mut config = KioskConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.camera_dir {
        config.camera_dir = Some(dir);
    }

    match cli.command {
        Commands::Health => {
            let client = HttpRecognitionClient::new(config.server)?;
            let health = client.health().await?;
            println!("{}", display::health_line(&health));
            Ok(())
        }
        Commands::Students => {
            let client = HttpRecognitionClient::new(config.server)?;
            let roster = client.students().await?;
            for line in display::roster_lines(&roster) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Stats => {
            let client = HttpRecognitionClient::new(config.server)?;
            let stats = client.stats().await?;
            println!("{}", display::stats_line(&stats));
            Ok(())
        }
        Commands::History { date } => {
            let client = HttpRecognitionClient::new(config.server)?;
            let day = client.attendance_for_date(date).await?;
            for line in display::history_lines(&day) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Register {
            name,
            student_id,
            retries,
        } => {
            let (mut orchestrator, shutdown) = build_orchestrator(&config, cli.mock)?;
            let report = register(&mut orchestrator, &name, &student_id, retries, &shutdown).await?;
            for line in display::report_lines(&report) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Improve {
            student_id,
            retries,
        } => {
            let (mut orchestrator, shutdown) = build_orchestrator(&config, cli.mock)?;
            let report = improve(&mut orchestrator, &student_id, retries, &shutdown).await?;
            for line in display::improvement_lines(&report) {
                println!("{}", line);
            }
            Ok(())
        }
        Commands::Attend { count } => {
            let (mut orchestrator, shutdown) = build_orchestrator(&config, cli.mock)?;
            let summary = attend(&mut orchestrator, count, &shutdown).await?;

            println!(
                "{} probes, {} marked, {} unmatched, {} failed",
                summary.probes, summary.marked, summary.unmatched, summary.failures
            );
            for line in display::ledger_lines(orchestrator.ledger()) {
                println!("  {}", line);
            }
            Ok(())
        }
    }
}

/// Wire collaborators, console output, and Ctrl-C handling
fn build_orchestrator(
    config: &KioskConfig,
    mock: bool,
) -> Result<(SessionOrchestrator, CancelToken), KioskError> {
    let (camera, service, session): (Arc<dyn Camera>, Arc<dyn RecognitionService>, SessionConfig) =
        if mock {
            info!("Using mock camera and recognition service");
            (
                Arc::new(MockCamera::new()),
                Arc::new(MockRecognitionService::new()),
                SessionConfig::rapid(),
            )
        } else {
            let dir = config.camera_dir.as_ref().ok_or(KioskError::NoCamera)?;
            let camera = ReplayCamera::from_dir(dir)?;
            info!("Replaying {} images from {}", camera.len(), dir.display());
            (
                Arc::new(camera),
                Arc::new(HttpRecognitionClient::new(config.server.clone())?),
                config.session.clone(),
            )
        };

    let orchestrator = SessionOrchestrator::new(session, camera, service)?;

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = display::describe(&event) {
                        println!("{}", line);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Console skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let shutdown = CancelToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling session");
            on_signal.cancel();
        }
    });

    Ok((orchestrator, shutdown))
}
