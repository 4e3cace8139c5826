//! Review Party command line.
//!
//! # Usage
//!
//! ```bash
//! # Run the background loops until Ctrl-C
//! review-party --config config.json serve
//!
//! # One-off commands
//! review-party assign https://gitlab.example.com/team/app/-/merge_requests/42
//! review-party register alice alice.gitlab --role lead
//! review-party deactivate alice
//! ```

use clap::{Parser, Subcommand};
use review_party_lib::config::AppConfig;
use review_party_lib::error::AppError;
use review_party_lib::models::Role;
use review_party_lib::services::{Assignment, Scheduler, SchedulerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync, tracker and digest loops
    Serve,

    /// Assign a review party to a merge request
    Assign {
        /// Merge request URL
        url: String,
    },

    /// Register a team member
    Register {
        /// Chat handle, with or without the leading @
        chat_username: String,

        /// GitLab user id or username
        gitlab: String,

        /// dev or lead
        #[arg(long, default_value = "dev")]
        role: Role,
    },

    /// Make a reviewer eligible again
    Activate { chat_username: String },

    /// Take a reviewer out of rotation and hand their reviews over
    Deactivate { chat_username: String },

    /// Run one sync + close pass
    Sync,

    /// Send the daily digest now (needs notifier.allow_manual_digest)
    Digest,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = AppConfig::load(&cli.config)?;
    let engine = review_party_lib::build_engine(&config).await?;

    match cli.command {
        Command::Serve => {
            let (handle, task) =
                Scheduler::start_background(engine, SchedulerConfig::from_config(&config));

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl-C: {}", e)))?;

            handle.stop().await?;
            task.await
                .map_err(|e| AppError::internal(format!("Scheduler task failed: {}", e)))?;
        }
        Command::Assign { url } => match engine.assign(&url).await? {
            Assignment::Created { mr, party } => {
                println!("Assigned {} reviewer(s) to {}", party.len(), mr.url);
                for reviewer in party {
                    println!("  @{} ({})", reviewer.chat_username, reviewer.role);
                }
            }
            Assignment::Existing { mr, party } => {
                println!("{} already has reviewers:", mr.url);
                for reviewer in party {
                    println!("  @{} ({})", reviewer.chat_username, reviewer.role);
                }
            }
        },
        Command::Register {
            chat_username,
            gitlab,
            role,
        } => {
            let reviewer = engine.register(&chat_username, &gitlab, role).await?;
            println!(
                "Registered @{} as {} (GitLab {})",
                reviewer.chat_username, reviewer.role, reviewer.gitlab_username
            );
        }
        Command::Activate { chat_username } => {
            let change = engine.set_active(&chat_username, true).await?;
            if change.changed {
                println!("@{} is active", change.reviewer.chat_username);
            } else {
                println!("@{} was already active", change.reviewer.chat_username);
            }
        }
        Command::Deactivate { chat_username } => {
            let change = engine.set_active(&chat_username, false).await?;
            match change.reallocation {
                Some(report) => println!(
                    "@{} is inactive: {} review(s) reassigned, {} without replacement, {} failed",
                    change.reviewer.chat_username,
                    report.reassigned.len(),
                    report.skipped.len(),
                    report.failed.len()
                ),
                None => println!("@{} was already inactive", change.reviewer.chat_username),
            }
        }
        Command::Sync => {
            let report = engine.sync_all().await?;
            println!(
                "Synced {} MR(s), {} closed upstream, {} closed as reviewed, {} failed",
                report.synced,
                report.force_closed,
                report.closed,
                report.failed.len()
            );
        }
        Command::Digest => {
            let sent = engine
                .send_digest_on_request(chrono::Utc::now().timestamp())
                .await?;
            println!("Digest sent to {} reviewer(s)", sent);
        }
    }

    Ok(())
}
