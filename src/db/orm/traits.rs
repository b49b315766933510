//! Entity definitions and the row collection contract
//!
//! A [`Table`] (or [`TableJoin`] for one-to-many child tables) is a static
//! descriptor: table name, column layout and, for joins, the owning table and
//! the foreign-key column. Concrete row types implement [`SqlRow`] to map to
//! and from stored rows, and collections of them implement [`RowCollection`].
//! The generic operations in [`super::QueryBuilder`] are written once against
//! these traits and never branch on a concrete entity type.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::Sqlite;
use uuid::Uuid;

use crate::db::error::DbResult;
use crate::db::sqlite_helpers::{bool_to_int, datetime_to_str, uuid_to_str};

/// Column definition for schema generation.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name in the database
    pub name: &'static str,
    /// SQLite column type (TEXT, INTEGER, REAL, BLOB)
    pub sql_type: &'static str,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub is_primary_key: bool,
    /// Default value expression (e.g., "0")
    pub default: Option<&'static str>,
    /// Referenced table; the referenced column is always `id`
    pub references: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            is_primary_key: false,
            default: None,
            references: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, "TEXT")
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, "INTEGER")
    }

    pub const fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default_value(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn references(mut self, table: &'static str) -> Self {
        self.references = Some(table);
        self
    }

    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);

        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }

        if !self.nullable && !self.is_primary_key {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        if let Some(table) = self.references {
            sql.push_str(&format!(" REFERENCES {}(id) ON DELETE CASCADE", table));
        }

        sql
    }
}

/// Static descriptor of a stored table.
///
/// Row values are always bound in `columns` order. Primary tables start with
/// the `id` column.
#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Destroy flips the `deleted` flag instead of removing the row
    pub soft_delete: bool,
    /// Creation timestamp column used by `destroy_expired`
    pub created_column: Option<&'static str>,
    /// Composite UNIQUE constraints
    pub unique_keys: &'static [&'static [&'static str]],
}

impl Table {
    pub const ID_COLUMN: &'static str = "id";
    pub const DELETED_COLUMN: &'static str = "deleted";

    pub const fn new(name: &'static str, columns: &'static [ColumnDef]) -> Self {
        Self {
            name,
            columns,
            soft_delete: false,
            created_column: None,
            unique_keys: &[],
        }
    }

    pub const fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub const fn created_column(mut self, column: &'static str) -> Self {
        self.created_column = Some(column);
        self
    }

    pub const fn unique_keys(mut self, keys: &'static [&'static [&'static str]]) -> Self {
        self.unique_keys = keys;
        self
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// `SELECT <columns> FROM <table>`
    pub fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.column_names().join(", "), self.name)
    }

    /// Parameterized INSERT covering every column
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            self.column_names().join(", "),
            crate::db::sqlite_helpers::placeholders(1, self.columns.len())
        )
    }

    /// Full-row replace keyed by `id`.
    ///
    /// Every column is assigned from its positional parameter (`?1` is the
    /// id), so values bind in the same order as for [`Table::insert_sql`].
    pub fn update_sql(&self) -> String {
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name != Self::ID_COLUMN)
            .map(|(i, c)| format!("{} = ?{}", c.name, i + 1))
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {} WHERE {} = ?1",
            self.name,
            assignments.join(", "),
            Self::ID_COLUMN
        );
        if self.soft_delete {
            sql.push_str(&format!(" AND {} = 0", Self::DELETED_COLUMN));
        }
        sql
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self.columns.iter().map(|c| c.to_sql()).collect();
        for key in self.unique_keys {
            defs.push(format!("UNIQUE ({})", key.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.name,
            defs.join(",\n  ")
        )
    }

    /// WHERE fragment that hides soft-deleted rows, if this table has them
    pub(crate) fn live_filter(&self, include_deleted: bool) -> Option<String> {
        (self.soft_delete && !include_deleted).then(|| format!("{} = 0", Self::DELETED_COLUMN))
    }
}

/// Static descriptor of a one-to-many child table owned by `parent`.
#[derive(Debug)]
pub struct TableJoin {
    pub table: Table,
    /// Owning table name
    pub parent: &'static str,
    /// Column holding the owner's identifier
    pub fk_column: &'static str,
    /// Whether rows are read back in insertion order
    pub ordered: bool,
}

impl TableJoin {
    pub const fn new(
        parent: &'static str,
        table: Table,
        fk_column: &'static str,
    ) -> Self {
        Self {
            table,
            parent,
            fk_column,
            ordered: true,
        }
    }

    pub const fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.table.name
    }
}

/// Represents a SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl SqlValue {
    /// Bind this value to a sqlx query builder at the next parameter index
    pub fn bind_to_query<'q>(
        &'q self,
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(bool_to_int(*b)),
            SqlValue::Null => query.bind(None::<String>),
        }
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::String(uuid_to_str(v))
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::String(datetime_to_str(v))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Mapping between a Rust value and one stored row.
pub trait SqlRow: Sized + Send + Sync + Unpin + 'static {
    /// Values in the column order of the table the row is stored in
    fn values(&self) -> Vec<SqlValue>;

    /// Decode a SQLite row into this type
    fn from_row(row: &SqliteRow) -> DbResult<Self>;
}

/// A row in a primary table, addressed by its identifier.
pub trait DatabaseEntity: SqlRow + Clone {
    fn table() -> &'static Table;

    fn id(&self) -> Uuid;

    /// Fill identifier and timestamps that are still unset
    fn assign_generated(&mut self, now: DateTime<Utc>);
}

/// A row in a join table, carrying its owner's identifier.
pub trait JoinRow: SqlRow {
    fn parent_id(&self) -> Uuid;
}

/// The seam the generic operations depend on: a container that can hand out
/// its rows in storage order and accept freshly decoded ones.
pub trait RowCollection: Default + Send + Sync + 'static {
    type Row: SqlRow;

    /// Call `f` with each held row, in storage order
    fn each<F: FnMut(&Self::Row)>(&self, f: F);

    /// Append one decoded row
    fn add(&mut self, row: Self::Row);
}
