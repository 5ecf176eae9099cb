use std::sync::Arc;

use course_core::object_url::ObjectStore;
use serde_json::json;
use services::{Clock, CommentService, ProgressService};
use storage::repository::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{ArgsError, Cli, Command, print_usage};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("PROGRESS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }

    let parsed = Cli::parse(argv, |name| std::env::var(name).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Reject a bad object store before touching the database.
    let store = ObjectStore::new(&parsed.config.endpoint, &parsed.config.bucket)?;

    prepare_sqlite_file(&parsed.config.db_url)?;
    let storage = Storage::sqlite(&parsed.config.db_url).await?;
    info!(db = %parsed.config.db_url, "storage ready");

    let clock = Clock::default();
    let progress = ProgressService::from_storage(clock, &storage, Arc::new(store));
    let comments = CommentService::new(clock, Arc::clone(&storage.comments));

    let output = match parsed.command {
        Command::Gems { step, user } => serde_json::to_value(progress.gem_tally(step, user).await?)?,
        Command::Completion { step } => {
            serde_json::to_value(progress.completion_set(step).await?)?
        }
        Command::Report { step, user } => {
            serde_json::to_value(progress.evaluation_report(step, user).await?)?
        }
        Command::Submit { attempt } => {
            let id = progress.submit_attempt(attempt).await?;
            json!({ "attempt_id": id })
        }
        Command::Grade {
            attempt,
            outcome,
            comment,
        } => serde_json::to_value(progress.record_grade(attempt, outcome, comment).await?)?,
        Command::Status { user, attempts } => {
            serde_json::to_value(progress.graded_attempts(user, &attempts).await?)?
        }
        Command::UploadKey {
            step,
            evaluation,
            user,
        } => {
            let key = progress.upload_object_key(step, evaluation, user).await?;
            json!({ "key": key })
        }
        Command::Comments { step, viewer } => {
            serde_json::to_value(comments.step_comments(step, viewer).await?)?
        }
        Command::Comment {
            step,
            user,
            content,
        } => serde_json::to_value(comments.post_comment(step, user, content).await?)?,
        Command::Upvote { comment, user } => {
            let state = comments.toggle_upvote(comment, user).await?;
            json!({ "comment_id": comment, "state": state })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
