use std::fmt;
use std::str::FromStr;

use course_core::model::{
    AttemptId, CommentId, EvaluationId, GradeOutcome, NewAttempt, StepId, UserId,
};

#[derive(Debug, PartialEq, Eq)]
pub enum ArgsError {
    MissingCommand,
    UnknownCommand(String),
    MissingValue { flag: &'static str },
    MissingFlag { command: &'static str, flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidOutcome { raw: String },
    InvalidDbUrl { raw: String },
    MissingSetting { flag: &'static str, env: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingCommand => write!(f, "missing command"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { command, flag } => {
                write!(f, "{command} requires {flag}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidOutcome { raw } => {
                write!(f, "invalid --outcome value (expected passed, failed or pending): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingSetting { flag, env } => {
                write!(f, "object storage is not configured: pass {flag} or set {env}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [flags]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  gems        --step <id> --user <id>        Total vs. earned gems");
    eprintln!("  completion  --step <id>                    Users who passed every evaluation");
    eprintln!("  report      --step <id> --user <id>        Evaluations in order with attempts");
    eprintln!("  submit      --user <id> --evaluation <id> --content <text>");
    eprintln!("  grade       --attempt <id> --outcome <passed|failed|pending> [--comment <text>]");
    eprintln!("  status      --user <id> --attempts <id,id,...>");
    eprintln!("  upload-key  --step <id> --evaluation <id> --user <id>");
    eprintln!("  comments    --step <id> --user <id>");
    eprintln!("  comment     --step <id> --user <id> --content <text>");
    eprintln!("  upvote      --comment-id <id> --user <id>");
    eprintln!();
    eprintln!("Shared flags:");
    eprintln!("  --db <sqlite_url>      SQLite URL (default: sqlite://dev.sqlite3)");
    eprintln!("  --endpoint <url>       Object storage endpoint");
    eprintln!("  --bucket <name>        Object storage bucket");
    eprintln!();
    eprintln!("Environment (flags win):");
    eprintln!("  PROGRESS_DB_URL, PROGRESS_S3_ENDPOINT, PROGRESS_S3_BUCKET, PROGRESS_LOG");
}

/// Connection settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_url: String,
    pub endpoint: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Gems { step: StepId, user: UserId },
    Completion { step: StepId },
    Report { step: StepId, user: UserId },
    Submit { attempt: NewAttempt },
    Grade {
        attempt: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
    },
    Status { user: UserId, attempts: Vec<AttemptId> },
    UploadKey {
        step: StepId,
        evaluation: EvaluationId,
        user: UserId,
    },
    Comments { step: StepId, viewer: UserId },
    Comment {
        step: StepId,
        user: UserId,
        content: String,
    },
    Upvote { comment: CommentId, user: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config: AppConfig,
    pub command: Command,
}

/// Raw flag values before the command picks the ones it needs.
#[derive(Default)]
struct Flags {
    db_url: Option<String>,
    endpoint: Option<String>,
    bucket: Option<String>,
    step: Option<StepId>,
    user: Option<UserId>,
    evaluation: Option<EvaluationId>,
    attempt: Option<AttemptId>,
    attempts: Option<Vec<AttemptId>>,
    comment_id: Option<CommentId>,
    outcome: Option<GradeOutcome>,
    content: Option<String>,
    comment: Option<String>,
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse::<T>()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

fn parse_outcome(raw: String) -> Result<GradeOutcome, ArgsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "passed" | "pass" => Ok(GradeOutcome::Passed),
        "failed" | "fail" => Ok(GradeOutcome::Failed),
        "pending" => Ok(GradeOutcome::Pending),
        _ => Err(ArgsError::InvalidOutcome { raw }),
    }
}

fn parse_id_list(raw: String) -> Result<Vec<AttemptId>, ArgsError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim().parse::<AttemptId>().map_err(|_| ArgsError::InvalidId {
                flag: "--attempts",
                raw: raw.clone(),
            })
        })
        .collect()
}

pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

impl Flags {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut flags = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    flags.db_url = Some(value);
                }
                "--endpoint" => flags.endpoint = Some(require_value(args, "--endpoint")?),
                "--bucket" => flags.bucket = Some(require_value(args, "--bucket")?),
                "--step" => flags.step = Some(parse_id(args, "--step")?),
                "--user" => flags.user = Some(parse_id(args, "--user")?),
                "--evaluation" => flags.evaluation = Some(parse_id(args, "--evaluation")?),
                "--attempt" => flags.attempt = Some(parse_id(args, "--attempt")?),
                "--attempts" => {
                    flags.attempts = Some(parse_id_list(require_value(args, "--attempts")?)?);
                }
                "--comment-id" => flags.comment_id = Some(parse_id(args, "--comment-id")?),
                "--outcome" => flags.outcome = Some(parse_outcome(require_value(args, "--outcome")?)?),
                "--content" => flags.content = Some(require_value(args, "--content")?),
                "--comment" => flags.comment = Some(require_value(args, "--comment")?),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        Ok(flags)
    }
}

fn required<T>(value: Option<T>, command: &'static str, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { command, flag })
}

/// Environment lookups first, flags override.
fn setting(
    flag: Option<String>,
    env: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Option<String> {
    flag.or_else(|| env(name))
        .filter(|value| !value.trim().is_empty())
}

impl Cli {
    /// Parse `args` (without the program name), reading defaults from `env`.
    ///
    /// # Errors
    ///
    /// Returns `ArgsError` for unknown commands or flags, malformed values and
    /// missing required settings.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut args = args.into_iter();
        let name = args.next().ok_or(ArgsError::MissingCommand)?;
        let mut flags = Flags::parse(&mut args)?;

        let db_url = setting(flags.db_url.take(), &env, "PROGRESS_DB_URL")
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let endpoint = setting(flags.endpoint.take(), &env, "PROGRESS_S3_ENDPOINT").ok_or(
            ArgsError::MissingSetting {
                flag: "--endpoint",
                env: "PROGRESS_S3_ENDPOINT",
            },
        )?;
        let bucket = setting(flags.bucket.take(), &env, "PROGRESS_S3_BUCKET").ok_or(
            ArgsError::MissingSetting {
                flag: "--bucket",
                env: "PROGRESS_S3_BUCKET",
            },
        )?;

        let command = match name.as_str() {
            "gems" => Command::Gems {
                step: required(flags.step, "gems", "--step")?,
                user: required(flags.user, "gems", "--user")?,
            },
            "completion" => Command::Completion {
                step: required(flags.step, "completion", "--step")?,
            },
            "report" => Command::Report {
                step: required(flags.step, "report", "--step")?,
                user: required(flags.user, "report", "--user")?,
            },
            "submit" => Command::Submit {
                attempt: NewAttempt::new(
                    required(flags.user, "submit", "--user")?,
                    required(flags.evaluation, "submit", "--evaluation")?,
                    required(flags.content, "submit", "--content")?,
                ),
            },
            "grade" => Command::Grade {
                attempt: required(flags.attempt, "grade", "--attempt")?,
                outcome: required(flags.outcome, "grade", "--outcome")?,
                comment: flags.comment,
            },
            "status" => Command::Status {
                user: required(flags.user, "status", "--user")?,
                attempts: required(flags.attempts, "status", "--attempts")?,
            },
            "upload-key" => Command::UploadKey {
                step: required(flags.step, "upload-key", "--step")?,
                evaluation: required(flags.evaluation, "upload-key", "--evaluation")?,
                user: required(flags.user, "upload-key", "--user")?,
            },
            "comments" => Command::Comments {
                step: required(flags.step, "comments", "--step")?,
                viewer: required(flags.user, "comments", "--user")?,
            },
            "comment" => Command::Comment {
                step: required(flags.step, "comment", "--step")?,
                user: required(flags.user, "comment", "--user")?,
                content: required(flags.content, "comment", "--content")?,
            },
            "upvote" => Command::Upvote {
                comment: required(flags.comment_id, "upvote", "--comment-id")?,
                user: required(flags.user, "upvote", "--user")?,
            },
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        Ok(Self {
            config: AppConfig {
                db_url,
                endpoint,
                bucket,
            },
            command,
        })
    }
}
