use thiserror::Error;

use crate::state::Direction;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("constraint violation on table `{table}`: {message}")]
    ConstraintViolation { table: String, message: String },

    #[error("dependency order violation on table `{table}`: {message}")]
    DependencyOrderViolation { table: String, message: String },

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("migration {migration} failed while {direction} table `{table}`: {source}")]
    MigrationFailure {
        migration: String,
        direction: Direction,
        table: String,
        #[source]
        source: Box<Error>,
    },

    #[error("migration lock is held: {0}")]
    LockHeld(String),

    #[error("invalid migration state transition: cannot {event} from {from}")]
    InvalidTransition { from: String, event: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Wrap a step error with the migration, direction and table it came from.
    pub fn in_step(self, migration: &str, direction: Direction, table: &str) -> Self {
        Error::MigrationFailure {
            migration: migration.to_string(),
            direction,
            table: table.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through `MigrationFailure` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::MigrationFailure { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether an operator may re-run the whole attempt unchanged.
    ///
    /// Only connectivity problems qualify; schema errors need a human.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Error::ConnectionFailure(_))
    }

    /// Table the failure is attributed to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Error::MigrationFailure { table, .. }
            | Error::ConstraintViolation { table, .. }
            | Error::DependencyOrderViolation { table, .. } => Some(table),
            _ => None,
        }
    }
}
