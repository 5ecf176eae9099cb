use std::fmt;

use chrono::{DateTime, Utc};
use course_core::model::{
    CourseId, EvaluationDefinition, EvaluationId, EvaluationKind, GradeOutcome, ModuleId,
    NewAttempt, StepId, StepLocation, UserId,
};
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    module_id: ModuleId,
    step_id: StepId,
    users: u32,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidUsers { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidUsers { raw } => write!(f, "invalid --users value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<u64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse::<u64>()
        .map_err(|_| ArgsError::InvalidId { flag, raw: value })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("PROGRESS_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id = CourseId::new(1);
        let mut module_id = ModuleId::new(1);
        let mut step_id = std::env::var("PROGRESS_STEP_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| StepId::new(1), StepId::new);
        let mut users = 3;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--course-id" => course_id = CourseId::new(parse_id(&mut args, "--course-id")?),
                "--module-id" => module_id = ModuleId::new(parse_id(&mut args, "--module-id")?),
                "--step-id" => step_id = StepId::new(parse_id(&mut args, "--step-id")?),
                "--users" => {
                    let value = require_value(&mut args, "--users")?;
                    users = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidUsers { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            course_id,
            module_id,
            step_id,
            users,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>          Course owning the seeded module (default: 1)");
    eprintln!("  --module-id <id>          Module owning the seeded step (default: 1)");
    eprintln!("  --step-id <id>            Step to upsert (default: 1)");
    eprintln!("  --users <n>               Number of learners with attempts (default: 3)");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PROGRESS_DB_URL, PROGRESS_STEP_ID");
}

/// Sample evaluations: (order, kind, gems, question).
const SAMPLE_EVALUATIONS: [(i32, &str, u32, &str); 3] = [
    (1, "text", 3, "What does the borrow checker prevent?"),
    (2, "image", 5, "Upload a screenshot of your passing test run"),
    (3, "text", 2, "Name one trait every error type should implement"),
];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let location = StepLocation::new(args.step_id, args.module_id, args.course_id);
    storage.steps.upsert_step(&location).await?;

    let base_id = args.step_id.value() * 100;
    let mut definitions = Vec::with_capacity(SAMPLE_EVALUATIONS.len());
    for (offset, (order, kind, gems, question)) in (1_u64..).zip(SAMPLE_EVALUATIONS) {
        let definition = EvaluationDefinition::new(
            EvaluationId::new(base_id + offset),
            args.step_id,
            order,
            EvaluationKind::from_tag(kind),
            gems,
        )
        .with_instruction(format!("Evaluation {order}"))
        .with_question(question);
        storage.evaluations.upsert_definition(&definition).await?;
        definitions.push(definition);
    }

    // Learner N passes the first `len - (N - 1)` evaluations, so learner 1
    // completes the step and later learners fall progressively behind.
    let mut created = 0_u32;
    for user in 1..=args.users {
        let user_id = UserId::new(u64::from(user));
        let passes = definitions.len().saturating_sub(user as usize - 1);
        for (idx, definition) in definitions.iter().enumerate() {
            let content = if definition.kind.is_image() {
                location.upload_object_key(definition.id, user_id, now)
            } else {
                format!("answer from learner {user}")
            };
            let attempt = match storage
                .attempts
                .create_attempt(NewAttempt::new(user_id, definition.id, content), now)
                .await
            {
                Ok(attempt) => attempt,
                Err(StorageError::Conflict) => continue,
                Err(e) => return Err(e.into()),
            };
            created += 1;

            let outcome = if idx < passes {
                GradeOutcome::Passed
            } else {
                GradeOutcome::Failed
            };
            storage
                .attempts
                .record_grade(attempt.id, outcome, Some("seeded review".into()), now)
                .await?;
        }
    }

    println!(
        "Seeded step {} with {} evaluations and {} new attempts into {}",
        args.step_id,
        definitions.len(),
        created,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
