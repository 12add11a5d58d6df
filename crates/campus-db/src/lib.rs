pub mod database;
pub mod ddl;
pub mod executor;
pub mod migrations;
pub mod migrator;
pub mod schema;

pub use ddl::Dialect;
pub use executor::{SchemaExecutor, classify_sqlite_error};
pub use migrations::{MIGRATIONS, Migration, Step};
pub use migrator::{BatchReport, MigrationStatus, Migrator, MigratorOptions};
pub use schema::TableDef;
