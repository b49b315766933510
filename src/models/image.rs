use async_graphql::SimpleObject;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::is_unset;
use crate::db::error::DbResult;
use crate::db::orm::{ColumnDef, DatabaseEntity, SqlRow, SqlValue, Table};
use crate::db::sqlite_helpers::{int_to_bool, str_to_datetime, str_to_uuid};

pub static IMAGE_TABLE: Table = Table::new(
    "images",
    &[
        ColumnDef::text("id").primary_key(),
        ColumnDef::text("url"),
        ColumnDef::integer("width").nullable(),
        ColumnDef::integer("height").nullable(),
        ColumnDef::text("created_at"),
        ColumnDef::integer("deleted").default_value("0"),
    ],
)
.soft_delete();

#[derive(Debug, Clone, Default, PartialEq, SimpleObject)]
pub struct Image {
    pub id: Uuid,
    pub url: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    #[graphql(skip)]
    pub created_at: DateTime<Utc>,
    #[graphql(skip)]
    pub deleted: bool,
}

impl Image {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl SqlRow for Image {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.url.clone().into(),
            self.width.into(),
            self.height.into(),
            self.created_at.into(),
            self.deleted.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            id: str_to_uuid(&row.try_get::<String, _>("id")?)?,
            url: row.try_get("url")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            created_at: str_to_datetime(&row.try_get::<String, _>("created_at")?)?,
            deleted: int_to_bool(row.try_get("deleted")?),
        })
    }
}

impl DatabaseEntity for Image {
    fn table() -> &'static Table {
        &IMAGE_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn assign_generated(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if is_unset(&self.created_at) {
            self.created_at = now;
        }
    }
}
