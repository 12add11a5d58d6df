//! Roles, permissions and the users that hold them.

use crate::migrations::Migration;
use crate::schema::{ColumnDef, ColumnType::*, DefaultValue, ForeignKeyDef, OnDelete, TableDef};

pub const ROLES: TableDef = TableDef {
    name: "roles",
    columns: &[
        ColumnDef::new("role_id", Increments),
        ColumnDef::new("role_name", Varchar(50)).not_null(),
        ColumnDef::new("role_description", Text),
        ColumnDef::new("created_at", TimestampTz).default_to(DefaultValue::Now),
    ],
    primary_key: &[],
    unique: &[],
    foreign_keys: &[],
};

pub const PERMISSIONS: TableDef = TableDef {
    name: "permissions",
    columns: &[
        ColumnDef::new("permission_id", Increments),
        ColumnDef::new("permission_name", Varchar(100)).not_null(),
        ColumnDef::new("module", Varchar(50)),
        ColumnDef::new("description", Text),
    ],
    primary_key: &[],
    unique: &[],
    foreign_keys: &[],
};

pub const ROLE_PERMISSIONS: TableDef = TableDef {
    name: "role_permissions",
    columns: &[
        ColumnDef::new("role_id", Integer).not_null(),
        ColumnDef::new("permission_id", Integer).not_null(),
    ],
    primary_key: &["role_id", "permission_id"],
    unique: &[],
    foreign_keys: &[
        ForeignKeyDef::new("role_id", "roles", "role_id", OnDelete::Cascade),
        ForeignKeyDef::new("permission_id", "permissions", "permission_id", OnDelete::Cascade),
    ],
};

pub const USERS: TableDef = TableDef {
    name: "users",
    columns: &[
        ColumnDef::new("user_id", Increments),
        ColumnDef::new("username", Varchar(100)).not_null(),
        ColumnDef::new("password_hash", Text).not_null(),
        ColumnDef::new("email", Varchar(150)),
        ColumnDef::new("full_name", Varchar(200)),
        ColumnDef::new("role_id", Integer),
        ColumnDef::new("is_active", Boolean).default_to(DefaultValue::Bool(true)),
        ColumnDef::new("created_at", TimestampTz).default_to(DefaultValue::Now),
        ColumnDef::new("last_login", TimestampTz),
    ],
    primary_key: &[],
    unique: &["username", "email"],
    foreign_keys: &[ForeignKeyDef::new(
        "role_id",
        "roles",
        "role_id",
        OnDelete::SetNull,
    )],
};

/// One-to-one link between a user account and a student record.
///
/// `student_id` is an opaque identifier; the students table lives elsewhere.
pub const STUDENT_USERS: TableDef = TableDef {
    name: "student_users",
    columns: &[
        ColumnDef::new("student_id", Integer).not_null(),
        ColumnDef::new("user_id", Integer).not_null(),
    ],
    primary_key: &["student_id", "user_id"],
    unique: &["user_id"],
    foreign_keys: &[ForeignKeyDef::new(
        "user_id",
        "users",
        "user_id",
        OnDelete::Cascade,
    )],
};

pub const MIGRATION: Migration = Migration {
    version: 20251129163139,
    name: "initial_schema",
    tables: &[ROLES, PERMISSIONS, ROLE_PERMISSIONS, USERS, STUDENT_USERS],
};
