use anyhow::{Context, Result};
use campus_common::{Direction, Error};
use campus_config::AppConfig;
use campus_db::migrations::MIGRATIONS;
use campus_db::{BatchReport, Dialect, MigrationStatus, Migrator, MigratorOptions, database};
use tracing::info;

fn open_migrator(config: &AppConfig) -> Result<Migrator> {
    let conn = database::open(&config.database.path, config.database.busy_timeout())
        .with_context(|| format!("opening {}", config.database.path.display()))?;
    let options = MigratorOptions {
        table_name: config.migrations.table_name.clone(),
        lock_table_name: config.migrations.lock_table_name.clone(),
    };
    Ok(Migrator::new(conn, options)?)
}

pub fn up(config: &AppConfig) -> Result<()> {
    let report = open_migrator(config)?.apply()?;
    println!("{}", describe_report(&report));
    Ok(())
}

pub fn down(config: &AppConfig) -> Result<()> {
    let report = open_migrator(config)?.revert()?;
    println!("{}", describe_report(&report));
    Ok(())
}

pub fn status(config: &AppConfig, json: bool) -> Result<()> {
    let statuses = open_migrator(config)?.status()?;
    if json {
        println!("{}", status_json(&statuses)?);
    } else {
        print!("{}", render_status(&statuses));
    }
    Ok(())
}

pub fn ddl(dialect: Dialect, down: bool) -> Result<()> {
    let direction = if down { Direction::Down } else { Direction::Up };
    for migration in MIGRATIONS {
        println!("-- {} ({direction}, {dialect})", migration.id());
        for statement in migration.ddl(direction, dialect) {
            println!("{statement};\n");
        }
    }
    Ok(())
}

pub fn unlock(config: &AppConfig) -> Result<()> {
    if open_migrator(config)?.force_unlock()? {
        println!("migration lock released");
    } else {
        println!("migration lock was not held");
    }
    Ok(())
}

fn describe_report(report: &BatchReport) -> String {
    let verb = match report.direction {
        Direction::Up => "applied",
        Direction::Down => "reverted",
    };
    match report.batch {
        None => match report.direction {
            Direction::Up => "already up to date".to_string(),
            Direction::Down => "nothing to revert".to_string(),
        },
        Some(batch) => {
            info!(batch, "{verb} {} migration(s)", report.migrations.len());
            let mut out = format!("batch {batch} {verb}:");
            for id in &report.migrations {
                out.push_str(&format!("\n  {id}"));
            }
            out
        }
    }
}

fn status_json(statuses: &[MigrationStatus]) -> campus_common::Result<String> {
    Ok(serde_json::to_string_pretty(statuses)?)
}

fn render_status(statuses: &[MigrationStatus]) -> String {
    let mut out = format!(
        "{:<16} {:<24} {:<10} {:<6} {}\n",
        "VERSION", "NAME", "STATE", "BATCH", "APPLIED AT"
    );
    for s in statuses {
        let name = if s.registered {
            s.name.clone()
        } else {
            format!("{} (unknown)", s.name)
        };
        out.push_str(&format!(
            "{:<16} {:<24} {:<10} {:<6} {}\n",
            s.version,
            name,
            s.state.to_string(),
            s.batch.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
            s.applied_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into()),
        ));
    }
    out
}

/// Operator guidance for a failed run, based on the innermost error.
pub fn failure_hint(err: &anyhow::Error) -> Option<&'static str> {
    let err = err.downcast_ref::<Error>()?;
    let direction = match err {
        Error::MigrationFailure { direction, .. } => Some(*direction),
        _ => None,
    };
    match (err.root(), direction) {
        (Error::ConnectionFailure(_), _) => {
            Some("the database was unreachable; re-run the whole command once it is back")
        }
        (Error::LockHeld(_), _) => Some(concat!(
            "another migration run holds the lock; wait for it, ",
            "or run `campus-migrate unlock` if it crashed"
        )),
        (Error::ConstraintViolation { .. }, Some(Direction::Up)) => Some(concat!(
            "a conflicting object already exists; inspect the schema ",
            "and run `campus-migrate down` before retrying"
        )),
        (Error::DependencyOrderViolation { .. }, _) => {
            Some("tables were processed out of dependency order; this is a bug in the migration")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use campus_common::MigrationState;

    use super::*;

    #[test]
    fn describes_empty_and_applied_batches() {
        let empty = BatchReport {
            direction: Direction::Up,
            batch: None,
            migrations: vec![],
        };
        assert_eq!(describe_report(&empty), "already up to date");

        let applied = BatchReport {
            direction: Direction::Down,
            batch: Some(3),
            migrations: vec!["20251129163139_initial_schema".into()],
        };
        assert_eq!(
            describe_report(&applied),
            "batch 3 reverted:\n  20251129163139_initial_schema"
        );
    }

    #[test]
    fn status_table_marks_pending_rows() {
        let rows = vec![MigrationStatus {
            version: 20251129163139,
            name: "initial_schema".into(),
            state: MigrationState::Unapplied,
            batch: None,
            applied_at: None,
            registered: true,
        }];
        let table = render_status(&rows);
        let line = table.lines().nth(1).unwrap();
        assert!(line.starts_with("20251129163139"));
        assert!(line.contains("unapplied"));
        assert!(line.trim_end().ends_with('-'));
    }

    #[test]
    fn status_json_uses_lowercase_states() {
        let rows = vec![MigrationStatus {
            version: 20251129163139,
            name: "initial_schema".into(),
            state: MigrationState::Applied,
            batch: Some(1),
            applied_at: None,
            registered: true,
        }];
        let value: serde_json::Value = serde_json::from_str(&status_json(&rows).unwrap()).unwrap();
        assert_eq!(value[0]["state"], "applied");
        assert_eq!(value[0]["batch"], 1);
        assert!(value[0]["applied_at"].is_null());
    }

    #[test]
    fn hints_follow_the_root_cause() {
        let err = anyhow::Error::new(
            Error::ConnectionFailure("database is locked".into()).in_step(
                "m",
                Direction::Up,
                "roles",
            ),
        );
        assert!(failure_hint(&err).unwrap().contains("re-run"));

        let err = anyhow::Error::new(
            Error::ConstraintViolation {
                table: "users".into(),
                message: "table users already exists".into(),
            }
            .in_step("m", Direction::Up, "users"),
        );
        assert!(failure_hint(&err).unwrap().contains("campus-migrate down"));

        let err = anyhow::anyhow!("something else");
        assert!(failure_hint(&err).is_none());
    }
}
