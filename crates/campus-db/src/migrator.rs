use std::collections::BTreeMap;

use campus_common::{Direction, Error, MigrationState, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior, params};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::executor::classify_sqlite_error;
use crate::migrations::{self, Migration};

/// Names of the bookkeeping tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratorOptions {
    pub table_name: String,
    pub lock_table_name: String,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            table_name: "_campus_migrations".into(),
            lock_table_name: "_campus_migrations_lock".into(),
        }
    }
}

/// Where a registered (or previously applied) migration stands.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub name: String,
    pub state: MigrationState,
    pub batch: Option<i64>,
    pub applied_at: Option<DateTime<Utc>>,
    /// False when the database records a version this build doesn't know.
    pub registered: bool,
}

/// Outcome of one `apply` or `revert` call.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub direction: Direction,
    pub batch: Option<i64>,
    pub migrations: Vec<String>,
}

impl BatchReport {
    fn empty(direction: Direction) -> Self {
        Self {
            direction,
            batch: None,
            migrations: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

struct AppliedRow {
    name: String,
    batch: i64,
    applied_at: String,
}

/// Applies and reverts migrations against a single SQLite connection,
/// recording what is applied and holding a lock row for the duration of
/// each attempt.
///
/// Applied migrations are grouped in batches: `apply` runs every pending
/// migration as one new batch, `revert` undoes the most recent batch. Each
/// migration runs in its own transaction together with its bookkeeping row,
/// so a failure leaves neither tables nor a record behind.
pub struct Migrator {
    conn: Connection,
    migrations: Vec<&'static Migration>,
    options: MigratorOptions,
}

impl Migrator {
    pub fn new(conn: Connection, options: MigratorOptions) -> Result<Self> {
        Self::with_migrations(conn, options, migrations::MIGRATIONS.iter().collect())
    }

    pub fn with_migrations(
        conn: Connection,
        options: MigratorOptions,
        migrations: Vec<&'static Migration>,
    ) -> Result<Self> {
        validate_identifier(&options.table_name)?;
        validate_identifier(&options.lock_table_name)?;
        if options.table_name == options.lock_table_name {
            return Err(Error::Config(
                "migration table and lock table must have different names".into(),
            ));
        }
        if let Some(w) = migrations.windows(2).find(|w| w[0].version >= w[1].version) {
            return Err(Error::Config(format!(
                "migration versions must be strictly increasing: {} is followed by {}",
                w[0].id(),
                w[1].id()
            )));
        }

        let migrator = Self {
            conn,
            migrations,
            options,
        };
        migrator.ensure_bookkeeping()?;
        Ok(migrator)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_bookkeeping(&self) -> Result<()> {
        let table = &self.options.table_name;
        let lock = &self.options.lock_table_name;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    version INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    batch INTEGER NOT NULL,
                    applied_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS \"{lock}\" (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    is_locked INTEGER NOT NULL DEFAULT 0,
                    locked_by TEXT,
                    locked_at TEXT
                );

                INSERT OR IGNORE INTO \"{lock}\" (id, is_locked) VALUES (1, 0);"
            ))
            .map_err(|e| classify_sqlite_error(table, e))
    }

    /// Apply every pending migration as a new batch.
    ///
    /// Stops at the first failure. Migrations applied earlier in the same
    /// call stay applied and recorded.
    pub fn apply(&mut self) -> Result<BatchReport> {
        self.with_lock(|m| {
            let pending = m.pending()?;
            if pending.is_empty() {
                info!("database schema is up to date");
                return Ok(BatchReport::empty(Direction::Up));
            }

            let batch = m.latest_batch()? + 1;
            let mut report = BatchReport::empty(Direction::Up);
            report.batch = Some(batch);
            for migration in pending {
                m.run_one(migration, Direction::Up, batch)?;
                report.migrations.push(migration.id());
            }
            info!(batch, count = report.migrations.len(), "applied migrations");
            Ok(report)
        })
    }

    /// Revert every migration in the latest batch, newest first.
    pub fn revert(&mut self) -> Result<BatchReport> {
        self.with_lock(|m| {
            let batch = m.latest_batch()?;
            if batch == 0 {
                info!("no applied migrations to revert");
                return Ok(BatchReport::empty(Direction::Down));
            }

            let mut report = BatchReport::empty(Direction::Down);
            report.batch = Some(batch);
            for version in m.versions_in_batch(batch)? {
                let migration = m
                    .migrations
                    .iter()
                    .copied()
                    .find(|x| x.version == version)
                    .ok_or_else(|| {
                        Error::NotFound(format!("applied migration {version} is not registered"))
                    })?;
                m.run_one(migration, Direction::Down, batch)?;
                report.migrations.push(migration.id());
            }
            info!(batch, count = report.migrations.len(), "reverted migrations");
            Ok(report)
        })
    }

    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        let mut applied = self.applied()?;
        let mut statuses: Vec<MigrationStatus> = self
            .migrations
            .iter()
            .map(|m| match applied.remove(&m.version) {
                Some(row) => MigrationStatus {
                    version: m.version,
                    name: m.name.to_string(),
                    state: MigrationState::Applied,
                    batch: Some(row.batch),
                    applied_at: parse_datetime(&row.applied_at),
                    registered: true,
                },
                None => MigrationStatus {
                    version: m.version,
                    name: m.name.to_string(),
                    state: MigrationState::Unapplied,
                    batch: None,
                    applied_at: None,
                    registered: true,
                },
            })
            .collect();

        for (version, row) in applied {
            statuses.push(MigrationStatus {
                version,
                name: row.name,
                state: MigrationState::Applied,
                batch: Some(row.batch),
                applied_at: parse_datetime(&row.applied_at),
                registered: false,
            });
        }
        statuses.sort_by_key(|s| s.version);
        Ok(statuses)
    }

    pub fn pending(&self) -> Result<Vec<&'static Migration>> {
        let applied = self.applied()?;
        Ok(self
            .migrations
            .iter()
            .copied()
            .filter(|m| !applied.contains_key(&m.version))
            .collect())
    }

    pub fn is_locked(&self) -> Result<bool> {
        let lock = &self.options.lock_table_name;
        self.conn
            .query_row(
                &format!("SELECT is_locked FROM \"{lock}\" WHERE id = 1"),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v != 0)
            .map_err(|e| classify_sqlite_error(lock, e))
    }

    /// Clear the lock regardless of who holds it. Returns whether it was held.
    ///
    /// Only for recovering from a run that died without releasing it.
    pub fn force_unlock(&self) -> Result<bool> {
        let lock = &self.options.lock_table_name;
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE \"{lock}\" SET is_locked = 0, locked_by = NULL, locked_at = NULL
                     WHERE id = 1 AND is_locked = 1"
                ),
                [],
            )
            .map_err(|e| classify_sqlite_error(lock, e))?;
        if changed > 0 {
            warn!("migration lock forcibly released");
        }
        Ok(changed > 0)
    }

    fn with_lock<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let token = self.acquire_lock()?;
        let result = f(self);
        if let Err(e) = self.release_lock(&token) {
            if result.is_ok() {
                return Err(e);
            }
            warn!("failed to release migration lock: {e}");
        }
        result
    }

    fn acquire_lock(&self) -> Result<String> {
        let lock = &self.options.lock_table_name;
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .conn
            .execute(
                &format!(
                    "UPDATE \"{lock}\" SET is_locked = 1, locked_by = ?1, locked_at = ?2
                     WHERE id = 1 AND is_locked = 0"
                ),
                params![token, Utc::now().to_rfc3339()],
            )
            .map_err(|e| classify_sqlite_error(lock, e))?;

        if acquired == 0 {
            let (by, at): (Option<String>, Option<String>) = self
                .conn
                .query_row(
                    &format!("SELECT locked_by, locked_at FROM \"{lock}\" WHERE id = 1"),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| classify_sqlite_error(lock, e))?;
            return Err(Error::LockHeld(format!(
                "held by {} since {}",
                by.as_deref().unwrap_or("unknown"),
                at.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(token)
    }

    fn release_lock(&self, token: &str) -> Result<()> {
        let lock = &self.options.lock_table_name;
        self.conn
            .execute(
                &format!(
                    "UPDATE \"{lock}\" SET is_locked = 0, locked_by = NULL, locked_at = NULL
                     WHERE id = 1 AND locked_by = ?1"
                ),
                params![token],
            )
            .map_err(|e| classify_sqlite_error(lock, e))?;
        Ok(())
    }

    fn run_one(
        &mut self,
        migration: &'static Migration,
        direction: Direction,
        batch: i64,
    ) -> Result<()> {
        let id = migration.id();
        let start = match direction {
            Direction::Up => MigrationState::Unapplied,
            Direction::Down => MigrationState::Applied,
        };
        let state = start.begin(direction)?;
        info!(migration = %id, batch, %state, "starting migration");

        let table = self.options.table_name.clone();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| classify_sqlite_error(&table, e))?;

        let steps = migration
            .run(direction, &*tx)
            .and_then(|()| record(&tx, &table, migration, direction, batch));
        let outcome = match steps {
            Ok(()) => tx.commit().map_err(|e| classify_sqlite_error(&table, e)),
            Err(e) => {
                // Dropping the transaction rolls it back.
                drop(tx);
                Err(e)
            }
        };

        match outcome {
            Ok(()) => {
                let state = state.succeed()?;
                info!(migration = %id, %state, "migration finished");
                Ok(())
            }
            Err(e) => {
                let state = state.fail()?;
                warn!(migration = %id, %state, "migration rolled back: {e}");
                Err(e)
            }
        }
    }

    fn applied(&self) -> Result<BTreeMap<i64, AppliedRow>> {
        let table = &self.options.table_name;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT version, name, batch, applied_at FROM \"{table}\""
            ))
            .map_err(|e| classify_sqlite_error(table, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    AppliedRow {
                        name: row.get(1)?,
                        batch: row.get(2)?,
                        applied_at: row.get(3)?,
                    },
                ))
            })
            .map_err(|e| classify_sqlite_error(table, e))?;

        let mut applied = BTreeMap::new();
        for row in rows {
            let (version, row) = row.map_err(|e| classify_sqlite_error(table, e))?;
            applied.insert(version, row);
        }
        Ok(applied)
    }

    fn latest_batch(&self) -> Result<i64> {
        let table = &self.options.table_name;
        self.conn
            .query_row(
                &format!("SELECT COALESCE(MAX(batch), 0) FROM \"{table}\""),
                [],
                |row| row.get(0),
            )
            .map_err(|e| classify_sqlite_error(table, e))
    }

    fn versions_in_batch(&self, batch: i64) -> Result<Vec<i64>> {
        let table = &self.options.table_name;
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT version FROM \"{table}\" WHERE batch = ?1 ORDER BY version DESC"
            ))
            .map_err(|e| classify_sqlite_error(table, e))?;

        let rows = stmt
            .query_map(params![batch], |row| row.get::<_, i64>(0))
            .map_err(|e| classify_sqlite_error(table, e))?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row.map_err(|e| classify_sqlite_error(table, e))?);
        }
        Ok(versions)
    }
}

fn record(
    conn: &Connection,
    table: &str,
    migration: &Migration,
    direction: Direction,
    batch: i64,
) -> Result<()> {
    let result = match direction {
        Direction::Up => conn.execute(
            &format!(
                "INSERT INTO \"{table}\" (version, name, batch, applied_at) VALUES (?1, ?2, ?3, ?4)"
            ),
            params![
                migration.version,
                migration.name,
                batch,
                Utc::now().to_rfc3339()
            ],
        ),
        Direction::Down => conn.execute(
            &format!("DELETE FROM \"{table}\" WHERE version = ?1"),
            params![migration.version],
        ),
    };
    result
        .map(|_| ())
        .map_err(|e| classify_sqlite_error(table, e))
}

fn validate_identifier(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid bookkeeping table name: {name:?}")))
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
