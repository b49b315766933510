//! Store-backed batch fetches
//!
//! Both fetches take a pooled connection per batch and never open a
//! transaction of their own.

use std::marker::PhantomData;

use tracing::debug;
use uuid::Uuid;

use super::batch::BatchFn;
use crate::db::Database;
use crate::db::error::DbResult;
use crate::db::orm::{DatabaseEntity, KeyedRows, QueryBuilder, RowCollection, TableJoin};

/// `SELECT ... FROM <table> WHERE id IN (...)`, soft-deleted rows excluded
pub struct EntityById<T> {
    db: Database,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> EntityById<T> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _phantom: PhantomData,
        }
    }
}

impl<T: DatabaseEntity> BatchFn<Uuid, T> for EntityById<T> {
    async fn load(&self, keys: &[Uuid]) -> DbResult<KeyedRows<T>> {
        debug!(entity = T::table().name, keys = keys.len(), "Batch loading entities");
        let mut conn = self.db.pool().acquire().await?;
        QueryBuilder::new(&mut *conn, self.db.registry())
            .find_by_ids::<T>(keys, false)
            .await
    }
}

/// `SELECT ... FROM <join> WHERE <fk> IN (...)`, grouped per parent in
/// insertion order
pub struct JoinByParent<C> {
    db: Database,
    join: &'static TableJoin,
    _phantom: PhantomData<fn() -> C>,
}

impl<C> JoinByParent<C> {
    pub fn new(db: Database, join: &'static TableJoin) -> Self {
        Self {
            db,
            join,
            _phantom: PhantomData,
        }
    }
}

impl<C: RowCollection> BatchFn<Uuid, C> for JoinByParent<C> {
    async fn load(&self, keys: &[Uuid]) -> DbResult<KeyedRows<C>> {
        debug!(
            relation = self.join.name(),
            fk_column = self.join.fk_column,
            keys = keys.len(),
            "Batch loading join rows"
        );
        let mut conn = self.db.pool().acquire().await?;
        QueryBuilder::new(&mut *conn, self.db.registry())
            .find_joins_grouped::<C>(self.join, keys)
            .await
    }
}
