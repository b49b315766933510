//! Generic persistence operations
//!
//! Create/Update/Find/FindByForeignKey/Destroy/DestroyExpired, written once
//! against [`Table`]/[`TableJoin`] descriptors and the [`SqlRow`] /
//! [`RowCollection`] contract. Every statement is parameterized.
//!
//! A [`QueryBuilder`] borrows a connection supplied by the caller, usually an
//! open transaction. It never begins, commits or rolls back anything itself,
//! so entity + join-collection writes stay all-or-nothing under the caller's
//! transaction.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use super::registry::TableRegistry;
use super::traits::{DatabaseEntity, JoinRow, RowCollection, SqlRow, SqlValue, Table, TableJoin};
use crate::db::error::{DbError, DbResult};
use crate::db::sqlite_helpers::{datetime_to_str, placeholders, str_to_uuid, uuid_to_str};

/// Rows of a multi-key read, keyed by the value of the key column.
///
/// A row that fails to decode poisons only its own key.
pub type KeyedRows<V> = HashMap<Uuid, DbResult<V>>;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_all<'q>(mut query: SqliteQuery<'q>, values: &'q [SqlValue]) -> SqliteQuery<'q> {
    for value in values {
        query = value.bind_to_query(query);
    }
    query
}

/// Build `SELECT ... WHERE c1 = ?1 AND c2 = ?2 ...` plus the soft-delete filter
fn select_where(table: &Table, columns: &[&str], include_deleted: bool, order: &str) -> String {
    let mut conditions: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ?{}", c, i + 1))
        .collect();
    conditions.extend(table.live_filter(include_deleted));

    let mut sql = table.select_sql();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(order);
    sql
}

/// Insertion order. Join rows have no key of their own, so `rowid` is the
/// only stable sequence they carry.
const ROW_ORDER: &str = " ORDER BY rowid";

pub struct QueryBuilder<'c> {
    conn: &'c mut SqliteConnection,
    registry: &'c TableRegistry,
}

impl<'c> QueryBuilder<'c> {
    pub fn new(conn: &'c mut SqliteConnection, registry: &'c TableRegistry) -> Self {
        Self { conn, registry }
    }

    pub fn registry(&self) -> &TableRegistry {
        self.registry
    }

    // ========================================================================
    // Primary entities
    // ========================================================================

    /// Insert `entity`, assigning identifier and timestamps if unset
    pub async fn create<T: DatabaseEntity>(&mut self, mut entity: T) -> DbResult<T> {
        let table = T::table();
        self.registry.require(table)?;

        entity.assign_generated(Utc::now());
        self.insert_row(table, &entity).await?;

        debug!(table = table.name, id = %entity.id(), "Created row");
        Ok(entity)
    }

    /// Full-row replace keyed by identifier
    pub async fn update<T: DatabaseEntity>(&mut self, entity: T) -> DbResult<T> {
        let table = T::table();
        self.registry.require(table)?;

        let sql = table.update_sql();
        let values = entity.values();
        let result = bind_all(sqlx::query(&sql), &values)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(table.name, entity.id()));
        }

        debug!(table = table.name, id = %entity.id(), "Updated row");
        Ok(entity)
    }

    /// Single-row read. Soft-deleted rows are treated as absent.
    pub async fn find<T: DatabaseEntity>(&mut self, id: Uuid) -> DbResult<Option<T>> {
        self.find_one_where::<T>(&[(Table::ID_COLUMN, id.into())], false)
            .await
    }

    /// Single-row read that also returns soft-deleted rows
    pub async fn find_with_deleted<T: DatabaseEntity>(&mut self, id: Uuid) -> DbResult<Option<T>> {
        self.find_one_where::<T>(&[(Table::ID_COLUMN, id.into())], true)
            .await
    }

    /// First row matching every `(column, value)` equality, in insertion order
    pub async fn find_one_where<T: DatabaseEntity>(
        &mut self,
        conditions: &[(&str, SqlValue)],
        include_deleted: bool,
    ) -> DbResult<Option<T>> {
        let table = T::table();
        self.registry.require(table)?;

        let columns: Vec<&str> = conditions.iter().map(|(c, _)| *c).collect();
        let values: Vec<SqlValue> = conditions.iter().map(|(_, v)| v.clone()).collect();
        let sql = select_where(table, &columns, include_deleted, " ORDER BY rowid LIMIT 1");

        let row = bind_all(sqlx::query(&sql), &values)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.as_ref().map(T::from_row).transpose()
    }

    /// All rows matching every `(column, value)` equality, in insertion order
    pub async fn find_where<C: RowCollection>(
        &mut self,
        table: &Table,
        conditions: &[(&str, SqlValue)],
        include_deleted: bool,
    ) -> DbResult<C> {
        self.registry.require(table)?;

        let columns: Vec<&str> = conditions.iter().map(|(c, _)| *c).collect();
        let values: Vec<SqlValue> = conditions.iter().map(|(_, v)| v.clone()).collect();
        let sql = select_where(table, &columns, include_deleted, ROW_ORDER);

        let rows = bind_all(sqlx::query(&sql), &values)
            .fetch_all(&mut *self.conn)
            .await?;

        let mut output = C::default();
        for row in &rows {
            output.add(C::Row::from_row(row)?);
        }
        Ok(output)
    }

    /// Multi-row read of the rows whose `fk_column` holds `parent_id`
    pub async fn find_by_foreign_key<C: RowCollection>(
        &mut self,
        table: &Table,
        fk_column: &str,
        parent_id: Uuid,
        include_deleted: bool,
    ) -> DbResult<C> {
        self.find_where(table, &[(fk_column, parent_id.into())], include_deleted)
            .await
    }

    /// Destroy by identifier: flips `deleted` on soft-delete tables, removes
    /// the row otherwise. Missing (or already deleted) ids are `NotFound`.
    pub async fn destroy<T: DatabaseEntity>(&mut self, id: Uuid) -> DbResult<()> {
        let table = T::table();
        self.registry.require(table)?;

        let sql = if table.soft_delete {
            format!(
                "UPDATE {} SET {} = 1 WHERE {} = ?1 AND {} = 0",
                table.name,
                Table::DELETED_COLUMN,
                Table::ID_COLUMN,
                Table::DELETED_COLUMN
            )
        } else {
            format!("DELETE FROM {} WHERE {} = ?1", table.name, Table::ID_COLUMN)
        };

        let result = sqlx::query(&sql)
            .bind(uuid_to_str(id))
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(table.name, id));
        }

        debug!(table = table.name, %id, soft = table.soft_delete, "Destroyed row");
        Ok(())
    }

    /// Hard delete every row matching every `(column, value)` equality;
    /// returns the number removed
    pub async fn destroy_where(
        &mut self,
        table: &Table,
        conditions: &[(&str, SqlValue)],
    ) -> DbResult<u64> {
        self.registry.require(table)?;
        if conditions.is_empty() {
            return Err(DbError::Definition(format!(
                "refusing unconditional delete on {}",
                table.name
            )));
        }

        let clauses: Vec<String> = conditions
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = ?{}", c, i + 1))
            .collect();
        let values: Vec<SqlValue> = conditions.iter().map(|(_, v)| v.clone()).collect();
        let sql = format!("DELETE FROM {} WHERE {}", table.name, clauses.join(" AND "));

        let result = bind_all(sqlx::query(&sql), &values)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove rows whose creation timestamp is older than `ttl`; returns the
    /// number removed
    pub async fn destroy_expired(&mut self, table: &Table, ttl: Duration) -> DbResult<u64> {
        self.registry.require(table)?;
        let column = table.created_column.ok_or_else(|| {
            DbError::Definition(format!("{} has no creation timestamp column", table.name))
        })?;

        let cutoff = datetime_to_str(Utc::now() - ttl);
        let sql = format!("DELETE FROM {} WHERE {} < ?1", table.name, column);
        let result = sqlx::query(&sql)
            .bind(cutoff)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() > 0 {
            debug!(table = table.name, removed = result.rows_affected(), "Destroyed expired rows");
        }
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Multi-key reads (used by the batching loaders)
    // ========================================================================

    /// `SELECT ... WHERE id IN (...)`, one entry per id found
    pub async fn find_by_ids<T: DatabaseEntity>(
        &mut self,
        ids: &[Uuid],
        include_deleted: bool,
    ) -> DbResult<KeyedRows<T>> {
        let table = T::table();
        let rows = self
            .fetch_keyed(table, Table::ID_COLUMN, ids, include_deleted, false)
            .await?;

        let mut output = KeyedRows::with_capacity(rows.len());
        for (id, row) in rows {
            output.insert(id, T::from_row(&row));
        }
        Ok(output)
    }

    /// `SELECT ... WHERE <key_column> IN (...)`, rows grouped per key in
    /// insertion order. Every requested key gets an entry, empty if nothing
    /// matched.
    pub async fn find_grouped<C: RowCollection>(
        &mut self,
        table: &Table,
        key_column: &str,
        keys: &[Uuid],
        include_deleted: bool,
    ) -> DbResult<KeyedRows<C>> {
        self.grouped(table, key_column, keys, include_deleted, true)
            .await
    }

    /// Join-table rows for many parents at once
    pub async fn find_joins_grouped<C: RowCollection>(
        &mut self,
        join: &TableJoin,
        parent_ids: &[Uuid],
    ) -> DbResult<KeyedRows<C>> {
        self.grouped(&join.table, join.fk_column, parent_ids, false, join.ordered)
            .await
    }

    async fn grouped<C: RowCollection>(
        &mut self,
        table: &Table,
        key_column: &str,
        keys: &[Uuid],
        include_deleted: bool,
        ordered: bool,
    ) -> DbResult<KeyedRows<C>> {
        let rows = self
            .fetch_keyed(table, key_column, keys, include_deleted, ordered)
            .await?;

        let mut output: KeyedRows<C> = keys.iter().map(|k| (*k, Ok(C::default()))).collect();
        for (key, row) in rows {
            let Some(Ok(collection)) = output.get_mut(&key) else {
                continue;
            };
            match C::Row::from_row(&row) {
                Ok(value) => collection.add(value),
                Err(e) => {
                    tracing::warn!(table = table.name, %key, error = %e, "Failed to decode row");
                    output.insert(key, Err(e));
                }
            }
        }
        Ok(output)
    }

    async fn fetch_keyed(
        &mut self,
        table: &Table,
        key_column: &str,
        keys: &[Uuid],
        include_deleted: bool,
        ordered: bool,
    ) -> DbResult<Vec<(Uuid, SqliteRow)>> {
        self.registry.require(table)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let unique: Vec<Uuid> = {
            let mut seen = HashSet::with_capacity(keys.len());
            keys.iter().copied().filter(|k| seen.insert(*k)).collect()
        };

        let mut sql = format!(
            "{} WHERE {} IN ({})",
            table.select_sql(),
            key_column,
            placeholders(1, unique.len())
        );
        if let Some(filter) = table.live_filter(include_deleted) {
            sql.push_str(" AND ");
            sql.push_str(&filter);
        }
        if ordered {
            sql.push_str(ROW_ORDER);
        }

        let values: Vec<SqlValue> = unique.iter().map(|k| SqlValue::from(*k)).collect();
        let rows = bind_all(sqlx::query(&sql), &values)
            .fetch_all(&mut *self.conn)
            .await?;

        debug!(
            table = table.name,
            key_column,
            keys = unique.len(),
            rows = rows.len(),
            "Multi-key read"
        );

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get(key_column)?;
            keyed.push((str_to_uuid(&raw)?, row));
        }
        Ok(keyed)
    }

    // ========================================================================
    // Join collections
    // ========================================================================

    /// Rows of `join` owned by `parent_id`, in insertion order
    pub async fn find_joins<C: RowCollection>(
        &mut self,
        join: &TableJoin,
        parent_id: Uuid,
    ) -> DbResult<C> {
        self.find_by_foreign_key(&join.table, join.fk_column, parent_id, false)
            .await
    }

    /// Insert every row of `rows` into `join`. Each owner must exist and not
    /// be soft-deleted.
    pub async fn create_joins<C>(&mut self, join: &TableJoin, rows: &C) -> DbResult<()>
    where
        C: RowCollection,
        C::Row: JoinRow,
    {
        let parent = self.registry.parent_of(join)?;

        let mut parents = Vec::new();
        let mut values = Vec::new();
        rows.each(|row| {
            let id = row.parent_id();
            if !parents.contains(&id) {
                parents.push(id);
            }
            values.push(row.values());
        });

        for parent_id in parents {
            self.ensure_live_parent(parent, parent_id).await?;
        }

        let sql = join.table.insert_sql();
        for row_values in &values {
            debug_assert_eq!(row_values.len(), join.table.columns.len());
            bind_all(sqlx::query(&sql), row_values)
                .execute(&mut *self.conn)
                .await?;
        }

        debug!(table = join.name(), rows = values.len(), "Created join rows");
        Ok(())
    }

    /// Delete every row of `join` owned by `parent_id`
    pub async fn destroy_joins(&mut self, join: &TableJoin, parent_id: Uuid) -> DbResult<u64> {
        self.registry.require(&join.table)?;
        let sql = format!("DELETE FROM {} WHERE {} = ?1", join.name(), join.fk_column);
        let result = sqlx::query(&sql)
            .bind(uuid_to_str(parent_id))
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Replace the whole collection owned by `parent_id` with `rows`
    pub async fn replace_joins<C>(
        &mut self,
        join: &TableJoin,
        parent_id: Uuid,
        rows: &C,
    ) -> DbResult<()>
    where
        C: RowCollection,
        C::Row: JoinRow,
    {
        self.destroy_joins(join, parent_id).await?;
        self.create_joins(join, rows).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn insert_row<R: SqlRow>(&mut self, table: &Table, row: &R) -> DbResult<()> {
        let sql = table.insert_sql();
        let values = row.values();
        debug_assert_eq!(values.len(), table.columns.len());
        bind_all(sqlx::query(&sql), &values)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn ensure_live_parent(&mut self, parent: &Table, parent_id: Uuid) -> DbResult<()> {
        let mut sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            parent.name,
            Table::ID_COLUMN
        );
        if let Some(filter) = parent.live_filter(false) {
            sql.push_str(" AND ");
            sql.push_str(&filter);
        }

        let found = sqlx::query(&sql)
            .bind(uuid_to_str(parent_id))
            .fetch_optional(&mut *self.conn)
            .await?;

        match found {
            Some(_) => Ok(()),
            None => Err(DbError::ConstraintViolation(format!(
                "{} '{}' does not exist or is deleted",
                parent.name, parent_id
            ))),
        }
    }
}
