use std::fmt;
use std::time::Duration;

use prep_core::model::{ExamCategory, SessionId, UserId};
use storage::rest::RestConfig;

const DEFAULT_DB_URL: &str = "sqlite:exam-prep.sqlite3";
const DEFAULT_QUESTION_COUNT: u32 = 20;
const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    MissingArgument { what: &'static str },
    InvalidCategory { raw: String },
    InvalidCount { raw: String },
    InvalidSessionId { raw: String },
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidBackend { raw: String },
    InvalidTimeout { raw: String },
    MissingRestSetting { var: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::MissingArgument { what } => write!(f, "missing {what}"),
            ArgsError::InvalidCategory { raw } => write!(f, "invalid --category value: {raw:?}"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid --count value: {raw}"),
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid session id: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid user id: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidBackend { raw } => {
                write!(f, "invalid backend {raw:?} (expected sqlite or rest)")
            }
            ArgsError::InvalidTimeout { raw } => write!(f, "invalid persist timeout: {raw}"),
            ArgsError::MissingRestSetting { var } => {
                write!(f, "{var} must be set for the rest backend")
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

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  exam-prep exam --category <name> [--count <n>] [--shuffle] [options]");
    eprintln!("  exam-prep results <session-id> [options]");
    eprintln!("  exam-prep review <session-id> [options]");
    eprintln!("  exam-prep stats [options]");
    eprintln!("  exam-prep categories [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --backend <sqlite|rest>   Storage backend (default: sqlite)");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: {DEFAULT_DB_URL})");
    eprintln!("  --user <uuid>             Local identity for the sqlite backend");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAMPREP_BACKEND, EXAMPREP_DB_URL, EXAMPREP_USER_ID");
    eprintln!("  EXAMPREP_REST_URL, EXAMPREP_REST_KEY, EXAMPREP_ACCESS_TOKEN");
    eprintln!("  EXAMPREP_PERSIST_TIMEOUT_SECS, EXAMPREP_LOG, EXAMPREP_LOG_JSON");
    eprintln!("  RUST_LOG overrides EXAMPREP_LOG.");
}

//
// ─── COMMANDS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exam {
        category: ExamCategory,
        count: u32,
        shuffle: bool,
    },
    Results(SessionId),
    Review(SessionId),
    Stats,
    Categories,
    Help,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite {
        db_url: String,
        user_id: Option<UserId>,
    },
    Rest(RestConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub command: Command,
    pub backend: Backend,
    pub persist_timeout: Duration,
    pub telemetry: TelemetrySettings,
}

/// Environment lookups, injectable so parsing stays testable.
pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl Settings {
    /// Load `.env` (if present), then parse the process arguments.
    ///
    /// # Errors
    ///
    /// Returns `ArgsError` for malformed flags or environment values.
    pub fn from_process() -> Result<Self, ArgsError> {
        dotenvy::dotenv().ok();
        Self::parse(std::env::args().skip(1), &ProcessEnv)
    }

    /// # Errors
    ///
    /// Returns `ArgsError` for malformed flags or environment values.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        env: &impl Env,
    ) -> Result<Self, ArgsError> {
        let mut args = args.into_iter();

        let mut backend_name = env.var("EXAMPREP_BACKEND").unwrap_or_else(|| "sqlite".into());
        let mut db_url = env.var("EXAMPREP_DB_URL").unwrap_or_else(|| DEFAULT_DB_URL.into());
        let mut user_raw = env.var("EXAMPREP_USER_ID");

        let mut subcommand: Option<String> = None;
        let mut positional: Option<String> = None;
        let mut category: Option<String> = None;
        let mut count = DEFAULT_QUESTION_COUNT;
        let mut shuffle = false;
        let mut help = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--backend" => backend_name = require_value(&mut args, "--backend")?,
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => user_raw = Some(require_value(&mut args, "--user")?),
                "--category" => category = Some(require_value(&mut args, "--category")?),
                "--count" => {
                    let value = require_value(&mut args, "--count")?;
                    count = value
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or(ArgsError::InvalidCount { raw: value })?;
                }
                "--shuffle" => shuffle = true,
                "--help" | "-h" => help = true,
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ if subcommand.is_none() => subcommand = Some(arg),
                _ if positional.is_none() => positional = Some(arg),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let command = if help {
            Command::Help
        } else {
            match subcommand.as_deref() {
                None => Command::Help,
                Some("exam") => {
                    let raw = category.ok_or(ArgsError::MissingArgument {
                        what: "--category",
                    })?;
                    let category = ExamCategory::new(raw.clone())
                        .map_err(|_| ArgsError::InvalidCategory { raw })?;
                    Command::Exam {
                        category,
                        count,
                        shuffle,
                    }
                }
                Some("results") => Command::Results(parse_session_id(positional)?),
                Some("review") => Command::Review(parse_session_id(positional)?),
                Some("stats") => Command::Stats,
                Some("categories") => Command::Categories,
                Some(other) => return Err(ArgsError::UnknownCommand(other.to_owned())),
            }
        };

        let backend = match backend_name.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Backend::Sqlite {
                db_url,
                user_id: user_raw.map(parse_user_id).transpose()?,
            },
            "rest" => Backend::Rest(RestConfig {
                base_url: env.var("EXAMPREP_REST_URL").ok_or(ArgsError::MissingRestSetting {
                    var: "EXAMPREP_REST_URL",
                })?,
                api_key: env.var("EXAMPREP_REST_KEY").ok_or(ArgsError::MissingRestSetting {
                    var: "EXAMPREP_REST_KEY",
                })?,
                access_token: env.var("EXAMPREP_ACCESS_TOKEN"),
            }),
            _ => return Err(ArgsError::InvalidBackend { raw: backend_name }),
        };

        let persist_timeout = match env.var("EXAMPREP_PERSIST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ArgsError::InvalidTimeout { raw })?,
            None => Duration::from_secs(DEFAULT_PERSIST_TIMEOUT_SECS),
        };

        let telemetry = TelemetrySettings {
            log_level: env
                .var("EXAMPREP_LOG")
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            json: env
                .var("EXAMPREP_LOG_JSON")
                .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        };

        Ok(Self {
            command,
            backend,
            persist_timeout,
            telemetry,
        })
    }
}

fn parse_session_id(raw: Option<String>) -> Result<SessionId, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArgument { what: "session id" })?;
    raw.parse()
        .map_err(|_| ArgsError::InvalidSessionId { raw })
}

fn parse_user_id(raw: String) -> Result<UserId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidUserId { raw })
}
