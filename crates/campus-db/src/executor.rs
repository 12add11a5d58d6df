use campus_common::Error;
use rusqlite::{Connection, ErrorCode, params};
use tracing::debug;

use crate::ddl::{self, Dialect};
use crate::schema::TableDef;

/// The two DDL capabilities a migration needs from a database target, plus
/// an existence probe used for dependency-order checks.
pub trait SchemaExecutor {
    fn create_table(&self, table: &TableDef) -> campus_common::Result<()>;

    /// Dropping a table that is already gone is not an error.
    fn drop_table_if_exists(&self, table: &str) -> campus_common::Result<()>;

    fn has_table(&self, table: &str) -> campus_common::Result<bool>;
}

/// Works on a plain connection and, through deref, on a `Transaction`.
impl SchemaExecutor for Connection {
    fn create_table(&self, table: &TableDef) -> campus_common::Result<()> {
        let sql = ddl::create_table_sql(table, Dialect::Sqlite);
        debug!("executing: {sql}");
        self.execute_batch(&sql)
            .map_err(|e| classify_sqlite_error(table.name, e))
    }

    fn drop_table_if_exists(&self, table: &str) -> campus_common::Result<()> {
        let sql = ddl::drop_table_sql(table);
        debug!("executing: {sql}");
        self.execute_batch(&sql)
            .map_err(|e| classify_sqlite_error(table, e))
    }

    fn has_table(&self, table: &str) -> campus_common::Result<bool> {
        self.query_row(
            "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .map_err(|e| classify_sqlite_error(table, e))
    }
}

/// Map a SQLite error raised while touching `table` onto the error taxonomy.
///
/// Name collisions and constraint failures become `ConstraintViolation`;
/// anything indicating the database itself is unreachable becomes
/// `ConnectionFailure`.
pub fn classify_sqlite_error(table: &str, err: rusqlite::Error) -> Error {
    let message = err.to_string();
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => Error::ConstraintViolation {
            table: table.to_string(),
            message,
        },
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly,
        ) => Error::ConnectionFailure(message),
        _ if message.contains("already exists") => Error::ConstraintViolation {
            table: table.to_string(),
            message,
        },
        _ => Error::Database(message),
    }
}
