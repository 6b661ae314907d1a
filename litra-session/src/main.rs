//! litra-session - command-line front end for a live translation session
//!
//! Opens a session on one chapter, runs a single operation and exits.
//! `watch` stays attached and prints session notices until Ctrl+C.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use litra_common::config::{CliOverrides, ConfigResolver, LoggingConfig};
use litra_common::events::SessionNotice;
use litra_session::session::TranslationMode;
use litra_session::{SessionContext, SessionController};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for litra-session
#[derive(Parser, Debug)]
#[command(name = "litra-session")]
#[command(about = "Live translation session for one chapter")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend REST base URL
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Realtime channel base URL
    #[arg(long, global = true)]
    channel_url: Option<String>,

    /// Disable the realtime channel
    #[arg(long, global = true)]
    no_realtime: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Upper bound on concurrent batch workers
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Book id
    #[arg(long, env = "LITRA_BOOK_ID")]
    book: String,

    /// Chapter id
    #[arg(long, env = "LITRA_CHAPTER_ID")]
    chapter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every paragraph with its session status
    Status,
    /// Translate and approve every pending paragraph
    Batch {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Print session notices until interrupted
    Watch,
    /// Translate one paragraph
    Translate {
        paragraph: String,
        /// Approve the result without review
        #[arg(long)]
        auto_approve: bool,
    },
    /// Glossary coverage of a paragraph's translation
    Coverage { paragraph: String },
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_file: self.config.clone(),
            backend_url: self.backend_url.clone(),
            channel_url: self.channel_url.clone(),
            no_realtime: self.no_realtime,
            log_level: self.log_level.clone(),
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Stderr subscriber used only while the configuration is being resolved
fn bootstrap_subscriber(level: Option<&str>) -> impl tracing::Subscriber + Send + Sync {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Install the global subscriber at the resolved level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.level).context("Invalid log level")?;

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.overrides());
    let bootstrap = bootstrap_subscriber(args.log_level.as_deref());
    let config = tracing::subscriber::with_default(bootstrap, || resolver.resolve())
        .context("Failed to resolve configuration")?;
    init_tracing(&config.logging)?;

    info!(
        "Starting litra-session v{} (backend {})",
        env!("CARGO_PKG_VERSION"),
        config.backend_url
    );

    let context = SessionContext::from_config(args.book.clone(), args.chapter.clone(), &config)
        .context("Failed to build session")?;
    let session = SessionController::start(context)
        .await
        .context("Failed to start session")?;

    let result = run(&session, args.command).await;
    session.shutdown().await;
    result
}

async fn run(session: &SessionController, command: Command) -> Result<()> {
    match command {
        Command::Status => {
            let snapshot = session.snapshot().await?;
            for view in &snapshot.paragraphs {
                let progress = view
                    .state
                    .progress
                    .as_ref()
                    .map(|p| format!(" {}%", p.progress))
                    .unwrap_or_default();
                println!(
                    "{:>4}  {:<12} {}{}",
                    view.paragraph.index,
                    view.state.status.to_string(),
                    view.paragraph.id,
                    progress
                );
            }
            println!(
                "{} paragraphs, {} pending, {} reviews resolved, channel {}",
                snapshot.paragraphs.len(),
                snapshot.pending_ids().len(),
                snapshot.resolved_reviews.len(),
                snapshot.connection_status()
            );
        }
        Command::Batch { yes } => {
            let Some(plan) = session.plan_batch().await? else {
                println!("Nothing pending");
                return Ok(());
            };
            if !yes && !confirm(&format!("Translate {} pending paragraphs?", plan.len()))? {
                println!("Cancelled");
                return Ok(());
            }
            let summary = session.run_batch(plan.confirm()).await?;
            println!("{} translated, {} failed", summary.success_count, summary.failed_count);
            for failure in &summary.failures {
                println!("  {}: {}", failure.paragraph_id, failure.message);
            }
        }
        Command::Watch => watch(session).await?,
        Command::Translate {
            paragraph,
            auto_approve,
        } => {
            let mode = if auto_approve {
                TranslationMode::AutoApprove
            } else {
                TranslationMode::ManualReview
            };
            let outcome = session.translate(&paragraph, mode).await?;
            println!("{}", outcome.translation);
            if let Some(analysis) = &outcome.analysis {
                println!("{}", serde_json::to_string_pretty(analysis)?);
            }
        }
        Command::Coverage { paragraph } => {
            let report = session.coverage(&paragraph).await?;
            println!("{}/{} glossary terms applied", report.applied, report.total);
            if report.is_complete() {
                println!("  every matched term is reflected in the translation");
            }
            for term in &report.missing_terms {
                println!("  missing: {} → {}", term.source_term, term.target_term);
            }
        }
    }
    Ok(())
}

async fn watch(session: &SessionController) -> Result<()> {
    let mut notices = session.notices();
    info!(status = %session.connection_status(), "Watching session notices");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            received = notices.recv() => match received {
                Ok(notice) => print_notice(&notice)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notice printer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_notice(notice: &SessionNotice) -> Result<()> {
    println!("{}", serde_json::to_string(notice)?);
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    use std::io::{BufRead, Write};

    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
