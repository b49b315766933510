//! Explicit registry of table descriptors.
//!
//! Built once at startup (or once per test) and handed to the persistence
//! layer; nothing here is global.

use super::traits::{Table, TableJoin};
use crate::db::error::{DbError, DbResult};

#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: Vec<&'static Table>,
    joins: Vec<&'static TableJoin>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primary table
    pub fn table(mut self, table: &'static Table) -> Self {
        if !self.tables.iter().any(|t| t.name == table.name) {
            self.tables.push(table);
        }
        self
    }

    /// Register a join table. Its parent should already be registered.
    pub fn join(mut self, join: &'static TableJoin) -> Self {
        debug_assert!(
            self.tables.iter().any(|t| t.name == join.parent),
            "join {} registered before its parent {}",
            join.name(),
            join.parent
        );
        if !self.joins.iter().any(|j| j.name() == join.name()) {
            self.joins.push(join);
        }
        self
    }

    pub fn find_table(&self, name: &str) -> Option<&'static Table> {
        self.tables
            .iter()
            .copied()
            .find(|t| t.name == name)
            .or_else(|| self.find_join(name).map(|j| &j.table))
    }

    pub fn find_join(&self, name: &str) -> Option<&'static TableJoin> {
        self.joins.iter().copied().find(|j| j.name() == name)
    }

    /// Fail unless `table` is registered
    pub fn require(&self, table: &Table) -> DbResult<()> {
        match self.find_table(table.name) {
            Some(_) => Ok(()),
            None => Err(DbError::Definition(format!(
                "table {} is not registered",
                table.name
            ))),
        }
    }

    /// Resolve the owning table of a join
    pub fn parent_of(&self, join: &TableJoin) -> DbResult<&'static Table> {
        self.require(&join.table)?;
        self.find_table(join.parent).ok_or_else(|| {
            DbError::Definition(format!(
                "parent {} of {} is not registered",
                join.parent,
                join.name()
            ))
        })
    }

    /// All tables, parents before the joins that reference them
    pub fn all_tables(&self) -> impl Iterator<Item = &'static Table> + '_ {
        self.tables
            .iter()
            .copied()
            .chain(self.joins.iter().copied().map(|j| &j.table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::orm::ColumnDef;

    static OWNERS: Table = Table::new("owners", &[ColumnDef::text("id").primary_key()]);
    static OWNER_TAGS: TableJoin = TableJoin::new(
        "owners",
        Table::new(
            "owner_tags",
            &[ColumnDef::text("owner_id").references("owners"), ColumnDef::text("tag")],
        ),
        "owner_id",
    );

    #[test]
    fn registries_are_independent() {
        let full = TableRegistry::new().table(&OWNERS).join(&OWNER_TAGS);
        let empty = TableRegistry::new();

        assert!(full.require(&OWNER_TAGS.table).is_ok());
        assert!(empty.require(&OWNERS).is_err());
        assert_eq!(full.parent_of(&OWNER_TAGS).unwrap().name, "owners");
    }

    #[test]
    fn parents_come_first() {
        let registry = TableRegistry::new().table(&OWNERS).join(&OWNER_TAGS).table(&OWNERS);
        let names: Vec<_> = registry.all_tables().map(|t| t.name).collect();
        assert_eq!(names, vec!["owners", "owner_tags"]);
    }
}
