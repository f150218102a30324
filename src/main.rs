// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Novel-Client command line
//!
//! Restores the persisted session, runs one account or catalogue command
//! against the hosted backend and prints the resulting notices.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use novel_client::{
    config::Config,
    models::{FileUpload, ProfileInput},
    notify::{ChannelNotifier, Notice, NoticeLevel},
    services::NovelQuery,
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reader and author client for the web-novel backend.
#[derive(Parser, Debug)]
#[command(name = "novel-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show who is signed in and whether onboarding is finished.
    Status,

    /// Sign in with email and password.
    Login {
        email: String,
        #[arg(long, env = "NOVEL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account.
    Register {
        email: String,
        #[arg(long, env = "NOVEL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the persisted session.
    Logout,

    /// Fill in the profile of the signed-in user.
    CompleteProfile {
        #[arg(long)]
        username: String,
        #[arg(long)]
        age: u32,
        /// Genre of interest (repeatable).
        #[arg(long = "genre")]
        genres: Vec<String>,
        #[arg(long, default_value = "")]
        bio: String,
        /// Image file uploaded as the profile picture.
        #[arg(long)]
        picture: Option<PathBuf>,
    },

    /// Re-read the profile from the backend.
    RefreshProfile,

    /// List novels, most viewed first.
    Novels {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, default_value = novel_client::services::novels::ALL_GENRES)]
        genre: String,
    },

    /// List the chapters of a novel.
    Chapters { novel_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // Load .env file if present
    init_logging();
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(backend = %config.backend_url, "Starting novel client");

    let (notifier, mut notices) = ChannelNotifier::new();
    let printer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            print_notice(&notice);
        }
    });

    let state = AppState::connect(config, Arc::new(notifier));
    state.session.start().await;

    let outcome = run(&state, cli.command).await;

    state.session.dispose();
    drop(state);
    // Every sender is gone once the state is dropped
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Notice printer failed");
    }

    outcome
}

async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    let session = &state.session;

    match command {
        Command::Status => print_status(state),
        Command::Login { email, password } => {
            if session.login(&email, &password).await.is_ok() {
                print_status(state);
            }
        }
        Command::Register { email, password } => {
            if session.register(&email, &password).await.is_ok() {
                print_status(state);
            }
        }
        Command::Logout => session.logout().await?,
        Command::CompleteProfile {
            username,
            age,
            genres,
            bio,
            picture,
        } => {
            let profile_picture = picture.as_deref().map(read_upload).transpose()?;
            let input = ProfileInput {
                username,
                age,
                interest_genres: genres,
                bio,
                profile_picture,
            };
            if let Err(e) = session.complete_profile(input).await {
                anyhow::bail!("{}", e);
            }
        }
        Command::RefreshProfile => match session.refresh_user_profile().await? {
            Some(_) => print_status(state),
            None => println!("Not signed in"),
        },
        Command::Novels { page, limit, genre } => {
            let request = NovelQuery {
                page,
                limit,
                genre,
                ..NovelQuery::default()
            };
            let listing = state.novels.fetch_novels(&request).await?;
            for novel in &listing.novels {
                println!("{}  {}  ({} views)", novel.novel_id, novel.title, novel.views);
            }
            println!(
                "page {} of {} novels{}",
                request.page,
                listing.total,
                if listing.has_more { ", more available" } else { "" }
            );
        }
        Command::Chapters { novel_id } => {
            for chapter in state.novels.list_chapters(&novel_id).await? {
                println!(
                    "{:>4}  {}  {}",
                    chapter.chapter_number, chapter.chapter_id, chapter.title
                );
            }
        }
    }

    Ok(())
}

fn print_status(state: &AppState) {
    let snapshot = state.session.snapshot();
    match &snapshot.identity {
        None => println!("Not signed in"),
        Some(identity) => {
            let email = identity.email.as_deref().unwrap_or("no email");
            println!("Signed in as {} ({})", identity.id, email);
            match &snapshot.profile {
                Some(profile) => println!(
                    "Profile: {}",
                    profile.username.as_deref().unwrap_or_default()
                ),
                None if snapshot.needs_profile_completion => {
                    println!("Profile incomplete, run complete-profile")
                }
                None => println!("No profile"),
            }
        }
    }
}

fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Success => println!("✓ {}", notice.message),
        NoticeLevel::Error => eprintln!("✗ {}", notice.message),
    }
}

fn read_upload(path: &Path) -> anyhow::Result<FileUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let content_type = match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };

    Ok(FileUpload {
        file_name,
        content_type: content_type.to_string(),
        bytes,
    })
}

/// Initialize logging on stderr; JSON lines when `LOG_FORMAT=json`.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("novel_client=info,warn"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
