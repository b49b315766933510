//! Schema synchronization from table descriptors
//!
//! Creates missing tables and adds missing columns for every registered
//! descriptor. Does NOT handle renames or type changes; real migrations are
//! handled outside this crate.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::error::DbResult;
use crate::db::orm::{ColumnDef, Table, TableRegistry};

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub columns_added: Vec<(String, String)>, // (table, column)
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> DbResult<bool> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Get existing columns for a table
async fn get_table_columns(pool: &SqlitePool, table_name: &str) -> DbResult<Vec<String>> {
    let rows: Vec<(i32, String, String, i32, Option<String>, i32)> =
        sqlx::query_as(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(_, name, _, _, _, _)| name).collect())
}

/// Sync a single table
pub async fn sync_table(pool: &SqlitePool, table: &Table) -> DbResult<SchemaSyncResult> {
    let mut result = SchemaSyncResult::default();

    if !table_exists(pool, table.name).await? {
        let create_sql = table.create_table_sql();
        debug!("Creating table {}: {}", table.name, create_sql);
        sqlx::query(&create_sql).execute(pool).await?;
        info!("Created table: {}", table.name);
        result.tables_created.push(table.name.to_string());
        return Ok(result);
    }

    let existing_columns = get_table_columns(pool, table.name).await?;
    for col_def in table.columns {
        if existing_columns.iter().any(|c| c == col_def.name) {
            continue;
        }
        let alter_sql = generate_add_column_sql(table.name, col_def);
        debug!("Adding column to {}: {}", table.name, alter_sql);
        sqlx::query(&alter_sql).execute(pool).await?;
        info!("Added column {}.{}", table.name, col_def.name);
        result
            .columns_added
            .push((table.name.to_string(), col_def.name.to_string()));
    }

    Ok(result)
}

/// Sync every table in the registry, parents first
pub async fn sync_registry(pool: &SqlitePool, registry: &TableRegistry) -> DbResult<SchemaSyncResult> {
    let mut total = SchemaSyncResult::default();
    for table in registry.all_tables() {
        let result = sync_table(pool, table).await?;
        total.tables_created.extend(result.tables_created);
        total.columns_added.extend(result.columns_added);
    }
    Ok(total)
}

/// Generate ALTER TABLE ADD COLUMN SQL
fn generate_add_column_sql(table_name: &str, col: &ColumnDef) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table_name, col.name, col.sql_type
    );

    // SQLite cannot add a NOT NULL column without a default
    if let Some(default) = col.default {
        sql.push_str(&format!(" DEFAULT {}", default));
    } else if !col.nullable {
        let fallback = if col.sql_type == "INTEGER" { "0" } else { "''" };
        sql.push_str(&format!(" NOT NULL DEFAULT {}", fallback));
    }

    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::orm::ColumnDef;

    static WIDGETS: Table = Table::new(
        "widgets",
        &[
            ColumnDef::text("id").primary_key(),
            ColumnDef::text("label"),
            ColumnDef::integer("deleted").default_value("0"),
        ],
    );

    #[tokio::test]
    async fn creates_then_extends_tables() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE widgets (id TEXT PRIMARY KEY)")
            .execute(&pool)
            .await
            .unwrap();

        let result = sync_table(&pool, &WIDGETS).await.unwrap();
        assert!(result.tables_created.is_empty());
        assert_eq!(
            result.columns_added,
            vec![
                ("widgets".to_string(), "label".to_string()),
                ("widgets".to_string(), "deleted".to_string()),
            ]
        );

        let again = sync_table(&pool, &WIDGETS).await.unwrap();
        assert!(again.columns_added.is_empty());
    }

    #[test]
    fn add_column_gets_a_default() {
        let sql = generate_add_column_sql("widgets", &ColumnDef::text("label"));
        assert_eq!(sql, "ALTER TABLE widgets ADD COLUMN label TEXT NOT NULL DEFAULT ''");
    }
}
