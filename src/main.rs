use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use placement_tracker::{build_router, db, ingest, report, AppState, Tracker};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "placement-tracker")]
#[command(about = "Placement outcome tracker for Group Scholar cohorts", long_about = None)]
struct Cli {
    /// Postgres connection string; the server runs in memory without one
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,
    #[arg(long, default_value_t = 5, global = true)]
    max_connections: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "PLACEMENT_TRACKER_BIND", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,
        #[arg(long, default_value_t = 10 * 1024 * 1024)]
        max_upload_bytes: usize,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Replace the roster with a students CSV
    ImportStudents {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Match and record an events CSV
    ImportEvents {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        class_id: Option<String>,
    },
    /// List rows waiting for manual resolution
    Unmatched,
    /// Bind an unmatched row to a student
    Resolve {
        #[arg(long)]
        row_id: Uuid,
        #[arg(long)]
        student_id: String,
    },
    /// Generate a markdown class report
    Report {
        #[arg(long)]
        class_id: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            max_upload_bytes,
        } => {
            info!("Starting placement-tracker v{}", env!("CARGO_PKG_VERSION"));
            let tracker = match cli.database_url.as_deref() {
                Some(url) => {
                    let pool = connect(url, cli.max_connections).await?;
                    db::init_db(&pool).await?;
                    Tracker::load(pool).await?
                }
                None => {
                    info!("DATABASE_URL not set; running without persistence");
                    Tracker::in_memory()
                }
            };

            let app = build_router(AppState::new(Arc::new(tracker), max_upload_bytes));
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!("placement-tracker listening on http://{bind}");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::InitDb => {
            let pool = connect(require_url(&cli.database_url)?, cli.max_connections).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::ImportStudents { csv } => {
            let tracker = load_tracker(&cli.database_url, cli.max_connections).await?;
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let replaced = tracker
                .replace_roster(ingest::parse_students(&bytes)?)
                .await?;
            println!(
                "Roster replaced with {} students from {} (version {}).",
                replaced.accepted,
                csv.display(),
                replaced.roster_version
            );
        }
        Commands::ImportEvents { csv, class_id } => {
            let tracker = load_tracker(&cli.database_url, cli.max_connections).await?;
            let bytes = std::fs::read(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let report = tracker
                .ingest(class_id.as_deref(), ingest::parse_events(&bytes)?)
                .await?;
            println!(
                "Recorded {} events from {}: {} matched, {} unmatched.",
                report.rows,
                csv.display(),
                report.matched_count,
                report.unmatched_count
            );
        }
        Commands::Unmatched => {
            let tracker = load_tracker(&cli.database_url, cli.max_connections).await?;
            let unmatched = tracker.list_unmatched().await;

            if unmatched.is_empty() {
                println!("No rows awaiting review.");
                return Ok(());
            }

            println!("Rows awaiting review:");
            for row in &unmatched {
                println!(
                    "- {} {} at {} (name {}, email {}, class {})",
                    row.row_id,
                    row.event_type.as_str(),
                    row.company.as_deref().unwrap_or("-"),
                    row.reported.name.as_deref().unwrap_or("-"),
                    row.reported.email.as_deref().unwrap_or("-"),
                    row.reported.class_id.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Resolve { row_id, student_id } => {
            let tracker = load_tracker(&cli.database_url, cli.max_connections).await?;
            let row = tracker.resolve(row_id, &student_id).await?;
            println!(
                "Row {} now belongs to {}.",
                row.row_id,
                row.student_id.as_deref().unwrap_or("-")
            );
        }
        Commands::Report { class_id, out } => {
            let tracker = load_tracker(&cli.database_url, cli.max_connections).await?;
            let summary = tracker.class_summary(&class_id).await;
            let students = tracker.class_students(&class_id).await;
            let recent = tracker.class_events(&class_id).await;
            let unmatched = tracker.list_unmatched().await;
            let report = report::build_report(
                chrono::Utc::now().date_naive(),
                &summary,
                &students,
                &recent,
                &unmatched,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn require_url(database_url: &Option<String>) -> anyhow::Result<&str> {
    database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")
}

async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_tracker(database_url: &Option<String>, max_connections: u32) -> anyhow::Result<Tracker> {
    let pool = connect(require_url(database_url)?, max_connections).await?;
    Ok(Tracker::load(pool).await?)
}

async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await;
}

async fn wait_for_signal(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "cannot listen for ctrl-c; serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
