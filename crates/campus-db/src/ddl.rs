use std::fmt;
use std::str::FromStr;

use campus_common::Error;

use crate::schema::{ColumnDef, ColumnType, DefaultValue, TableDef};

/// SQL dialect to render DDL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        })
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(Error::Config(format!("unsupported SQL dialect: {other}"))),
        }
    }
}

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `CREATE TABLE` statement for `table`, with constraints named the way knex
/// names them.
pub fn create_table_sql(table: &TableDef, dialect: Dialect) -> String {
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_sql(c, dialect))
        .collect();

    if !table.primary_key.is_empty() {
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            quote(&format!("{}_pkey", table.name)),
            column_list(table.primary_key)
        ));
    }

    for col in table.unique {
        lines.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote(&format!("{}_{col}_unique", table.name)),
            quote(col)
        ));
    }

    for fk in table.foreign_keys {
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
            quote(&format!("{}_{}_foreign", table.name, fk.column)),
            quote(fk.column),
            quote(fk.references_table),
            quote(fk.references_column),
            fk.on_delete.as_sql()
        ));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote(table.name),
        lines.join(",\n    ")
    )
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote(table))
}

fn column_list(cols: &[&str]) -> String {
    cols.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

fn column_sql(col: &ColumnDef, dialect: Dialect) -> String {
    let mut sql = format!("{} {}", quote(col.name), type_sql(col.ty, dialect));
    if col.ty == ColumnType::Increments {
        // Type already carries PRIMARY KEY (and NOT NULL).
        return sql;
    }
    if !col.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default_sql(default, dialect));
    }
    sql
}

fn type_sql(ty: ColumnType, dialect: Dialect) -> String {
    match (ty, dialect) {
        (ColumnType::Increments, Dialect::Sqlite) => "INTEGER PRIMARY KEY AUTOINCREMENT".into(),
        (ColumnType::Increments, Dialect::Postgres) => "SERIAL PRIMARY KEY".into(),
        (ColumnType::Integer, _) => "INTEGER".into(),
        (ColumnType::Varchar(len), _) => format!("VARCHAR({len})"),
        (ColumnType::Text, _) => "TEXT".into(),
        (ColumnType::Boolean, _) => "BOOLEAN".into(),
        (ColumnType::TimestampTz, Dialect::Sqlite) => "DATETIME".into(),
        (ColumnType::TimestampTz, Dialect::Postgres) => "TIMESTAMPTZ".into(),
    }
}

fn default_sql(default: DefaultValue, dialect: Dialect) -> String {
    match (default, dialect) {
        // SQLite has no zoned timestamp type; store UTC with an explicit `Z`.
        (DefaultValue::Now, Dialect::Sqlite) => "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))".into(),
        (DefaultValue::Now, Dialect::Postgres) => "CURRENT_TIMESTAMP".into(),
        (DefaultValue::Bool(b), Dialect::Sqlite) => (if b { "1" } else { "0" }).into(),
        (DefaultValue::Bool(b), Dialect::Postgres) => b.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::initial_schema::{ROLES, STUDENT_USERS, USERS};

    #[test]
    fn renders_surrogate_key_per_dialect() {
        let sqlite = create_table_sql(&ROLES, Dialect::Sqlite);
        assert!(sqlite.starts_with("CREATE TABLE \"roles\" ("));
        assert!(sqlite.contains("\"role_id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sqlite.contains("\"role_name\" VARCHAR(50) NOT NULL"));
        assert!(sqlite.contains("DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))"));

        let pg = create_table_sql(&ROLES, Dialect::Postgres);
        assert!(pg.contains("\"role_id\" SERIAL PRIMARY KEY"));
        assert!(pg.contains("\"created_at\" TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP"));
    }

    #[test]
    fn renders_named_constraints() {
        let sql = create_table_sql(&USERS, Dialect::Postgres);
        assert!(sql.contains("CONSTRAINT \"users_username_unique\" UNIQUE (\"username\")"));
        assert!(sql.contains("CONSTRAINT \"users_email_unique\" UNIQUE (\"email\")"));
        assert!(sql.contains(
            "CONSTRAINT \"users_role_id_foreign\" FOREIGN KEY (\"role_id\") \
             REFERENCES \"roles\" (\"role_id\") ON DELETE SET NULL"
        ));
        assert!(sql.contains("\"is_active\" BOOLEAN DEFAULT true"));

        let sql = create_table_sql(&STUDENT_USERS, Dialect::Sqlite);
        assert!(sql.contains(
            "CONSTRAINT \"student_users_pkey\" PRIMARY KEY (\"student_id\", \"user_id\")"
        ));
        assert!(sql.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn drop_is_conditional() {
        assert_eq!(drop_table_sql("users"), "DROP TABLE IF EXISTS \"users\"");
    }

    #[test]
    fn dialect_parses_aliases() {
        assert_eq!("PG".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("mysql".parse::<Dialect>().is_err());
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
