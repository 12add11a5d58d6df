//! Migration units and the ordered-step executor that runs them.
//!
//! A migration is a versioned list of tables. Applying creates them in list
//! order; reverting drops them in exact reverse order. Each step is checked
//! against the live schema before it runs so an out-of-order create or drop
//! is refused instead of leaving dangling foreign keys behind.

pub mod initial_schema;

use campus_common::{Direction, Error, Result};
use tracing::info;

use crate::ddl::{self, Dialect};
use crate::executor::SchemaExecutor;
use crate::schema::TableDef;

/// Every migration known to this build, oldest first.
pub static MIGRATIONS: &[Migration] = &[initial_schema::MIGRATION];

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    /// Tables in creation order. Parents must precede children.
    pub tables: &'static [TableDef],
}

/// One unit of DDL work.
#[derive(Debug, Clone, Copy)]
pub enum Step<'a> {
    Create(&'a TableDef),
    Drop(&'a TableDef),
}

impl Step<'_> {
    pub fn table(&self) -> &'static str {
        match self {
            Step::Create(t) | Step::Drop(t) => t.name,
        }
    }

    pub fn sql(&self, dialect: Dialect) -> String {
        match self {
            Step::Create(t) => ddl::create_table_sql(t, dialect),
            Step::Drop(t) => ddl::drop_table_sql(t.name),
        }
    }
}

impl Migration {
    /// Identifier shown to operators, e.g. `20251129163139_initial_schema`.
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    pub fn steps(&self, direction: Direction) -> Vec<Step<'static>> {
        match direction {
            Direction::Up => self.tables.iter().map(Step::Create).collect(),
            Direction::Down => self.tables.iter().rev().map(Step::Drop).collect(),
        }
    }

    pub fn ddl(&self, direction: Direction, dialect: Dialect) -> Vec<String> {
        self.steps(direction).iter().map(|s| s.sql(dialect)).collect()
    }

    /// Create every table. The caller owns the surrounding transaction.
    pub fn apply(&self, exec: &dyn SchemaExecutor) -> Result<()> {
        self.run(Direction::Up, exec)
    }

    /// Drop every table, tolerating ones that are already gone.
    pub fn revert(&self, exec: &dyn SchemaExecutor) -> Result<()> {
        self.run(Direction::Down, exec)
    }

    pub fn run(&self, direction: Direction, exec: &dyn SchemaExecutor) -> Result<()> {
        self.run_steps(direction, &self.steps(direction), exec)
    }

    /// Execute `steps` one at a time, stopping at the first failure.
    ///
    /// The returned error names this migration, the direction and the table
    /// of the failing step. Steps after it are never attempted.
    pub fn run_steps(
        &self,
        direction: Direction,
        steps: &[Step<'_>],
        exec: &dyn SchemaExecutor,
    ) -> Result<()> {
        let id = self.id();
        for step in steps {
            info!(migration = %id, table = step.table(), "{direction} table");
            self.check_order(step, exec)
                .and_then(|()| match step {
                    Step::Create(t) => exec.create_table(t),
                    Step::Drop(t) => exec.drop_table_if_exists(t.name),
                })
                .map_err(|e| e.in_step(&id, direction, step.table()))?;
        }
        Ok(())
    }

    fn check_order(&self, step: &Step<'_>, exec: &dyn SchemaExecutor) -> Result<()> {
        match step {
            Step::Create(table) => {
                for parent in table.dependencies() {
                    if !exec.has_table(parent)? {
                        return Err(Error::DependencyOrderViolation {
                            table: table.name.to_string(),
                            message: format!("references `{parent}`, which does not exist yet"),
                        });
                    }
                }
            }
            Step::Drop(table) => {
                for child in self.tables.iter().filter(|t| t.references(table.name)) {
                    if exec.has_table(child.name)? {
                        return Err(Error::DependencyOrderViolation {
                            table: table.name.to_string(),
                            message: format!("still referenced by `{}`", child.name),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
