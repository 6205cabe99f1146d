//! Memorai CLI - batch summarization and memory inspection
//!
//! Usage:
//!   memorai batch                          Summarize on a fixed interval until ctrl-c
//!   memorai cycle                          Run one summarization cycle
//!   memorai enhance --user-id u1 -q "..."  Show the retrieval-augmented prompt
//!   memorai history --user-id u1           Show recent turns
//!   memorai summaries --user-id u1         Show stored window summaries

use clap::{Parser, Subcommand};
use colored::*;
use memorai::{
    ConversationStore, CycleReport, MemoraiConfig, MemoraiSystem, OutcomeStatus, Role,
    SummaryStore,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memorai")]
#[command(about = "Memorai - conversation memory for chat assistants")]
#[command(version)]
struct Cli {
    /// SQLite connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run summarization cycles on a fixed interval until interrupted
    Batch {
        /// Seconds between cycles
        #[arg(long, env = "BATCH_INTERVAL_SECS")]
        interval_secs: Option<u64>,

        /// Window length in seconds
        #[arg(long, env = "BATCH_WINDOW_SECS")]
        window_secs: Option<u64>,
    },

    /// Run a single summarization cycle ending now
    Cycle {
        /// Window length in seconds
        #[arg(long, env = "BATCH_WINDOW_SECS")]
        window_secs: Option<u64>,
    },

    /// Print the prompt a chat request would be answered with
    Enhance {
        #[arg(short, long)]
        user_id: String,

        /// The user's question
        #[arg(short, long)]
        query: String,

        /// Number of summaries to retrieve
        #[arg(short = 'k', long, env = "RETRIEVAL_TOP_K")]
        top_k: Option<usize>,
    },

    /// Show a user's most recent turns
    History {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List a user's stored window summaries
    Summaries {
        #[arg(short, long)]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "debug"
    } else {
        "info,memorai=debug"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = MemoraiConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Batch {
            interval_secs,
            window_secs,
        } => {
            if let Some(secs) = interval_secs {
                config.batch_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = window_secs {
                config.batch_window = Duration::from_secs(secs);
            }
            cmd_batch(config).await
        }
        Commands::Cycle { window_secs } => {
            if let Some(secs) = window_secs {
                config.batch_window = Duration::from_secs(secs);
            }
            cmd_cycle(config).await
        }
        Commands::Enhance {
            user_id,
            query,
            top_k,
        } => {
            if let Some(k) = top_k {
                config.retrieval_top_k = k;
            }
            cmd_enhance(config, &user_id, &query).await
        }
        Commands::History { user_id, limit } => cmd_history(config, &user_id, limit).await,
        Commands::Summaries { user_id } => cmd_summaries(config, &user_id).await,
    }
}

async fn cmd_batch(config: MemoraiConfig) -> anyhow::Result<()> {
    let system = MemoraiSystem::connect(config).await?;
    let scheduler = system.scheduler()?;

    println!(
        "{} every {}s, press ctrl-c to stop",
        "Summarizing".green().bold(),
        scheduler.interval().as_secs()
    );

    let stats = scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
        })
        .await;

    println!();
    println!(
        "{} {} cycles ({} failed)",
        "Stopped after".bold(),
        stats.cycles,
        stats.failed_cycles.to_string().red()
    );
    Ok(())
}

async fn cmd_cycle(config: MemoraiConfig) -> anyhow::Result<()> {
    let system = MemoraiSystem::connect(config).await?;
    let report = system.pipeline()?.run_cycle_now().await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!("{} {}", "Cycle window".bold().underline(), report.window);

    if report.outcomes.is_empty() {
        println!("{}", "No active users".yellow());
        return;
    }

    for outcome in &report.outcomes {
        match &outcome.status {
            OutcomeStatus::Summarized { turns, dimension } => println!(
                "  {} {} ({} turns, {}-d vector)",
                "ok".green(),
                outcome.user_id.cyan(),
                turns,
                dimension
            ),
            OutcomeStatus::NoTurns => println!(
                "  {} {} (no turns in window)",
                "--".dimmed(),
                outcome.user_id.cyan()
            ),
            OutcomeStatus::Failed { stage, error } => println!(
                "  {} {} failed at {}: {}",
                "!!".red(),
                outcome.user_id.cyan(),
                stage,
                error
            ),
        }
    }

    println!();
    println!(
        "Summarized: {}  No turns: {}  Failed: {}",
        report.summarized().to_string().green(),
        report.no_turns(),
        report.failed().to_string().red()
    );
}

async fn cmd_enhance(config: MemoraiConfig, user_id: &str, query: &str) -> anyhow::Result<()> {
    let system = MemoraiSystem::connect(config).await?;
    let enhanced = system.enhancer()?.enhance_prompt(user_id, query).await;

    if let Some(e) = &enhanced.fallback {
        println!("{} {}", "Retrieval failed, using query as is:".yellow(), e);
    } else if !enhanced.is_augmented() {
        println!("{}", "No stored summaries for this user".yellow());
    } else {
        println!("{}", "Retrieved summaries:".bold());
        for (i, scored) in enhanced.summaries_used.iter().enumerate() {
            println!(
                "{}. {} (distance: {:.4})",
                i + 1,
                scored.record.window.to_string().dimmed(),
                scored.distance
            );
        }
    }

    println!();
    println!("{}", "Prompt".bold().underline());
    println!("{}", enhanced.text);
    Ok(())
}

async fn cmd_history(config: MemoraiConfig, user_id: &str, limit: usize) -> anyhow::Result<()> {
    let system = MemoraiSystem::connect(config).await?;
    let mut turns = system.conversations().list_recent(user_id, limit).await?;
    turns.reverse();

    if turns.is_empty() {
        println!("{}", "No conversations found".yellow());
        return Ok(());
    }

    for turn in &turns {
        let role = match turn.role {
            Role::User => "user".cyan(),
            Role::Assistant => "assistant".green(),
            Role::System => "system".dimmed(),
        };
        let mut flags = String::new();
        if turn.liked {
            flags.push_str(" +1");
        }
        if turn.disliked {
            flags.push_str(" -1");
        }
        println!(
            "{} {:>9}{}: {}",
            turn.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            role,
            flags.yellow(),
            turn.content
        );
    }

    Ok(())
}

async fn cmd_summaries(config: MemoraiConfig, user_id: &str) -> anyhow::Result<()> {
    let system = MemoraiSystem::connect(config).await?;
    let records = system.summaries().list_for_user(user_id).await?;

    if records.is_empty() {
        println!("{}", "No summaries found".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} summaries:", records.len()).bold().green()
    );
    println!();

    for record in &records {
        println!(
            "{} {} ({}-d)",
            record.id.get(..8).unwrap_or(&record.id).dimmed(),
            record.window.to_string().cyan(),
            record.dimension()
        );
        println!("    {}", record.summary);
    }

    Ok(())
}
