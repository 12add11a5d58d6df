//! Declarative table descriptors.
//!
//! Tables are plain `const` data: a list of columns plus primary key, unique
//! and foreign key constraints. The DDL renderer and the migration step
//! executor interpret these; nothing here talks to a database.

/// Column storage type, independent of SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer surrogate key. Always the sole primary key.
    Increments,
    Integer,
    Varchar(u32),
    Text,
    Boolean,
    /// Timestamp carrying timezone information.
    TimestampTz,
}

/// Column default captured at insertion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Now,
    Bool(bool),
}

/// What happens to a referencing row when its parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: !matches!(ty, ColumnType::Increments),
            default: None,
        }
    }

    pub const fn not_null(self) -> Self {
        Self {
            nullable: false,
            ..self
        }
    }

    pub const fn default_to(self, default: DefaultValue) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
    pub on_delete: OnDelete,
}

impl ForeignKeyDef {
    pub const fn new(
        column: &'static str,
        references_table: &'static str,
        references_column: &'static str,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            column,
            references_table,
            references_column,
            on_delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Empty when the key comes from an `Increments` column.
    pub primary_key: &'static [&'static str],
    pub unique: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKeyDef],
}

impl TableDef {
    /// Other tables this one holds foreign keys into.
    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.foreign_keys
            .iter()
            .map(|fk| fk.references_table)
            .filter(move |t| *t != self.name)
    }

    pub fn references(&self, table: &str) -> bool {
        self.dependencies().any(|t| t == table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENTS: TableDef = TableDef {
        name: "parents",
        columns: &[ColumnDef::new("id", ColumnType::Increments)],
        primary_key: &[],
        unique: &[],
        foreign_keys: &[],
    };

    const CHILDREN: TableDef = TableDef {
        name: "children",
        columns: &[
            ColumnDef::new("id", ColumnType::Integer).not_null(),
            ColumnDef::new("parent_id", ColumnType::Integer),
            ColumnDef::new("sibling_id", ColumnType::Integer),
        ],
        primary_key: &["id", "parent_id"],
        unique: &["sibling_id"],
        foreign_keys: &[
            ForeignKeyDef::new("parent_id", "parents", "id", OnDelete::Cascade),
            ForeignKeyDef::new("sibling_id", "children", "id", OnDelete::SetNull),
        ],
    };

    #[test]
    fn increments_column_is_never_nullable() {
        assert!(!PARENTS.columns[0].nullable);
        assert!(CHILDREN.columns[1].nullable);
    }

    #[test]
    fn self_references_are_not_dependencies() {
        let deps: Vec<_> = CHILDREN.dependencies().collect();
        assert_eq!(deps, vec!["parents"]);
        assert!(CHILDREN.references("parents"));
        assert!(!CHILDREN.references("children"));
        assert!(!PARENTS.references("children"));
    }

    #[test]
    fn builder_methods_compose() {
        let col = ColumnDef::new("flag", ColumnType::Boolean).default_to(DefaultValue::Bool(true));
        assert!(col.nullable);
        assert_eq!(col.default, Some(DefaultValue::Bool(true)));
        assert!(!col.not_null().nullable);
    }
}
