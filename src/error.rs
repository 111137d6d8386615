//! Top-level error types for fleetcron.

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cron(#[from] CronError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation errors.
///
/// Raised from [`crate::config::Config::validate_strict`] and from
/// [`crate::coordinator::Coordinator::start`] when the coordinator was
/// built from an unvalidated config.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {}", .violations.join("; "))]
pub struct ConfigError {
    pub violations: Vec<String>,
}

/// Cron expression parsing errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CronError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

/// Lease/audit backend failures.
///
/// The coordinator never propagates these outward during a tick — they are
/// logged and treated as "did not acquire" / "did not log" per spec §7.
/// They are still a distinct public type because backend constructors and
/// direct backend calls (outside the tick loop, e.g. from tests or an
/// operator tool) need something concrete to match on.
#[derive(Debug, thiserror::Error)]
#[error("backend error ({backend}): {message}")]
pub struct BackendError {
    pub backend: &'static str,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl BackendError {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
            source: None,
        }
    }

    pub fn from_source(backend: &'static str, source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        Self {
            message: source.to_string(),
            backend,
            source: Some(source),
        }
    }
}

/// A user callback invocation failed.
#[derive(Debug, thiserror::Error)]
#[error("callback for job '{job_key}' firing {firing_instant} failed: {source}")]
pub struct CallbackError {
    pub job_key: String,
    pub firing_instant: chrono::DateTime<chrono::Utc>,
    #[source]
    pub source: anyhow::Error,
}

/// Job registration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistrationError {
    #[error("job key must not be empty")]
    EmptyKey,

    #[error("cron expression must not be empty")]
    EmptyExpression,

    #[error("job '{0}' is already registered")]
    DuplicateKey(String),

    #[error("job '{0}' is not registered")]
    NotFound(String),
}
