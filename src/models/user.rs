//! Account records: users, invite keys and pending activations
//!
//! None of these are soft-deleted. Pending activations expire after a
//! configured time-to-live and are swept by `DestroyExpired`.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use super::enums::{PendingActivationType, StoredEnum};
use super::is_unset;
use crate::db::error::DbResult;
use crate::db::orm::{ColumnDef, DatabaseEntity, SqlRow, SqlValue, Table};
use crate::db::sqlite_helpers::{str_to_datetime, str_to_uuid, str_to_uuid_opt};

pub static USER_TABLE: Table = Table::new(
    "users",
    &[
        ColumnDef::text("id").primary_key(),
        ColumnDef::text("name"),
        ColumnDef::text("email"),
        ColumnDef::text("password_hash"),
        ColumnDef::text("invited_by").nullable(),
        ColumnDef::text("created_at"),
        ColumnDef::text("updated_at"),
    ],
)
.unique_keys(&[&["name"], &["email"]]);

pub static INVITE_KEY_TABLE: Table = Table::new(
    "invite_keys",
    &[
        ColumnDef::text("id").primary_key(),
        ColumnDef::text("generated_by").references("users"),
        ColumnDef::text("generated_at"),
    ],
);

pub static PENDING_ACTIVATION_TABLE: Table = Table::new(
    "pending_activations",
    &[
        ColumnDef::text("id").primary_key(),
        ColumnDef::text("email"),
        ColumnDef::text("invite_key").nullable(),
        ColumnDef::text("type"),
        ColumnDef::text("time"),
    ],
)
.created_column("time")
.unique_keys(&[&["email", "type"]]);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }
}

impl SqlRow for User {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.email.clone().into(),
            self.password_hash.clone().into(),
            self.invited_by.into(),
            self.created_at.into(),
            self.updated_at.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            id: str_to_uuid(&row.try_get::<String, _>("id")?)?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            invited_by: str_to_uuid_opt(row.try_get::<Option<String>, _>("invited_by")?.as_deref())?,
            created_at: str_to_datetime(&row.try_get::<String, _>("created_at")?)?,
            updated_at: str_to_datetime(&row.try_get::<String, _>("updated_at")?)?,
        })
    }
}

impl DatabaseEntity for User {
    fn table() -> &'static Table {
        &USER_TABLE
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
        if is_unset(&self.updated_at) {
            self.updated_at = now;
        }
    }
}

/// Invite key handed out by an existing user; the key is the record id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InviteKey {
    pub id: Uuid,
    pub generated_by: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl SqlRow for InviteKey {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.generated_by.into(),
            self.generated_at.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        Ok(Self {
            id: str_to_uuid(&row.try_get::<String, _>("id")?)?,
            generated_by: str_to_uuid(&row.try_get::<String, _>("generated_by")?)?,
            generated_at: str_to_datetime(&row.try_get::<String, _>("generated_at")?)?,
        })
    }
}

impl DatabaseEntity for InviteKey {
    fn table() -> &'static Table {
        &INVITE_KEY_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn assign_generated(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if is_unset(&self.generated_at) {
            self.generated_at = now;
        }
    }
}

/// A registration or password reset waiting for its emailed key.
/// The activation key is the record id.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingActivation {
    pub id: Uuid,
    pub email: String,
    pub invite_key: Option<Uuid>,
    pub activation_type: PendingActivationType,
    pub time: DateTime<Utc>,
}

impl PendingActivation {
    pub fn new(email: impl Into<String>, activation_type: PendingActivationType) -> Self {
        Self {
            id: Uuid::nil(),
            email: email.into(),
            invite_key: None,
            activation_type,
            time: DateTime::<Utc>::default(),
        }
    }
}

impl SqlRow for PendingActivation {
    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.email.clone().into(),
            self.invite_key.into(),
            self.activation_type.as_str().into(),
            self.time.into(),
        ]
    }

    fn from_row(row: &SqliteRow) -> DbResult<Self> {
        let token: String = row.try_get("type")?;
        let activation_type = PendingActivationType::from_token(&token).ok_or_else(|| {
            crate::db::DbError::Decode(format!("unknown activation type '{}'", token))
        })?;

        Ok(Self {
            id: str_to_uuid(&row.try_get::<String, _>("id")?)?,
            email: row.try_get("email")?,
            invite_key: str_to_uuid_opt(row.try_get::<Option<String>, _>("invite_key")?.as_deref())?,
            activation_type,
            time: str_to_datetime(&row.try_get::<String, _>("time")?)?,
        })
    }
}

impl DatabaseEntity for PendingActivation {
    fn table() -> &'static Table {
        &PENDING_ACTIVATION_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn assign_generated(&mut self, now: DateTime<Utc>) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if is_unset(&self.time) {
            self.time = now;
        }
    }
}
