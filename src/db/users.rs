//! Users repository: accounts, invite keys and pending activations
//!
//! Activation keys can only be looked up with an [`ActivationLookup`], which
//! only [`UserRepository::clear_expired_activations`] hands out. Any lookup is
//! therefore preceded by a successful sweep of expired records.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use super::error::{DbError, DbResult};
use super::orm::{QueryBuilder, SqlValue, TableRegistry};
use crate::models::{
    InviteKey, PENDING_ACTIVATION_TABLE, PendingActivation, PendingActivationType, StoredEnum,
    User,
};

/// Proof that expired activations were swept before a key lookup
#[derive(Debug)]
pub struct ActivationLookup {
    ttl: Duration,
    swept_at: DateTime<Utc>,
}

impl ActivationLookup {
    pub fn swept_at(&self) -> DateTime<Utc> {
        self.swept_at
    }

    /// A record that expired after the sweep is stale, not valid
    fn check(&self, activation: PendingActivation) -> DbResult<PendingActivation> {
        if activation.time < Utc::now() - self.ttl {
            return Err(DbError::StaleKey {
                table: PENDING_ACTIVATION_TABLE.name,
                id: activation.id.to_string(),
            });
        }
        Ok(activation)
    }
}

pub struct UserRepository<'c> {
    qb: QueryBuilder<'c>,
}

impl<'c> UserRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection, registry: &'c TableRegistry) -> Self {
        Self {
            qb: QueryBuilder::new(conn, registry),
        }
    }

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    pub async fn find_user(&mut self, id: Uuid) -> DbResult<Option<User>> {
        self.qb.find(id).await
    }

    pub async fn find_user_by_email(&mut self, email: &str) -> DbResult<Option<User>> {
        self.qb.find_one_where(&[("email", email.into())], false).await
    }

    pub async fn find_user_by_name(&mut self, name: &str) -> DbResult<Option<User>> {
        self.qb.find_one_where(&[("name", name.into())], false).await
    }

    pub async fn create_user(&mut self, user: User) -> DbResult<User> {
        self.qb.create(user).await
    }

    pub async fn update_user(&mut self, user: User) -> DbResult<User> {
        self.qb.update(user).await
    }

    // ------------------------------------------------------------------------
    // Invite keys
    // ------------------------------------------------------------------------

    pub async fn create_invite_key(&mut self, generated_by: Uuid) -> DbResult<InviteKey> {
        self.qb
            .create(InviteKey {
                generated_by,
                ..Default::default()
            })
            .await
    }

    pub async fn find_invite_key(&mut self, id: Uuid) -> DbResult<Option<InviteKey>> {
        self.qb.find(id).await
    }

    pub async fn destroy_invite_key(&mut self, id: Uuid) -> DbResult<()> {
        self.qb.destroy::<InviteKey>(id).await
    }

    // ------------------------------------------------------------------------
    // Pending activations
    // ------------------------------------------------------------------------

    /// Remove every activation older than `ttl`
    pub async fn clear_expired_activations(&mut self, ttl: Duration) -> DbResult<ActivationLookup> {
        let swept_at = Utc::now();
        let removed = self
            .qb
            .destroy_expired(&PENDING_ACTIVATION_TABLE, ttl)
            .await?;
        debug!(removed, "Cleared expired activations");
        Ok(ActivationLookup { ttl, swept_at })
    }

    /// Activation by key. A record that outlived its ttl since the sweep is
    /// reported as [`DbError::StaleKey`].
    pub async fn find_activation(
        &mut self,
        lookup: &ActivationLookup,
        key: Uuid,
    ) -> DbResult<Option<PendingActivation>> {
        let found: Option<PendingActivation> = self.qb.find(key).await?;
        found.map(|a| lookup.check(a)).transpose()
    }

    pub async fn find_activation_by_email(
        &mut self,
        lookup: &ActivationLookup,
        email: &str,
        activation_type: PendingActivationType,
    ) -> DbResult<Option<PendingActivation>> {
        let found: Option<PendingActivation> = self
            .qb
            .find_one_where(
                &[
                    ("email", email.into()),
                    ("type", activation_type.as_str().into()),
                ],
                false,
            )
            .await?;
        found.map(|a| lookup.check(a)).transpose()
    }

    pub async fn find_activation_by_invite_key(
        &mut self,
        lookup: &ActivationLookup,
        invite_key: Uuid,
    ) -> DbResult<Option<PendingActivation>> {
        let found: Option<PendingActivation> = self
            .qb
            .find_one_where(
                &[
                    ("invite_key", SqlValue::from(invite_key)),
                    ("type", PendingActivationType::NewUser.as_str().into()),
                ],
                false,
            )
            .await?;
        found.map(|a| lookup.check(a)).transpose()
    }

    pub async fn create_activation(
        &mut self,
        activation: PendingActivation,
    ) -> DbResult<PendingActivation> {
        self.qb.create(activation).await
    }

    pub async fn destroy_activation(&mut self, id: Uuid) -> DbResult<()> {
        self.qb.destroy::<PendingActivation>(id).await
    }

    /// Remove any activation of `activation_type` for `email`, expired or not
    pub async fn destroy_activations_for(
        &mut self,
        email: &str,
        activation_type: PendingActivationType,
    ) -> DbResult<u64> {
        self.qb
            .destroy_where(
                &PENDING_ACTIVATION_TABLE,
                &[
                    ("email", email.into()),
                    ("type", activation_type.as_str().into()),
                ],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        let db = Database::in_memory(models::registry()).await.unwrap();
        db.sync_schema().await.unwrap();
        db
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_records() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = UserRepository::new(&mut *conn, db.registry());

        let mut old = PendingActivation::new("old@example.org", PendingActivationType::NewUser);
        old.time = Utc::now() - Duration::hours(3);
        let old = repo.create_activation(old).await.unwrap();
        let fresh = repo
            .create_activation(PendingActivation::new(
                "fresh@example.org",
                PendingActivationType::NewUser,
            ))
            .await
            .unwrap();

        let lookup = repo.clear_expired_activations(Duration::hours(2)).await.unwrap();
        assert_eq!(repo.find_activation(&lookup, old.id).await.unwrap(), None);
        assert_eq!(
            repo.find_activation(&lookup, fresh.id).await.unwrap().map(|a| a.id),
            Some(fresh.id)
        );
    }

    #[tokio::test]
    async fn records_expiring_after_the_sweep_are_stale() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = UserRepository::new(&mut *conn, db.registry());

        let mut activation =
            PendingActivation::new("jane@example.org", PendingActivationType::ResetPassword);
        activation.time = Utc::now() - Duration::milliseconds(1500);
        let activation = repo.create_activation(activation).await.unwrap();

        let lookup = repo.clear_expired_activations(Duration::seconds(2)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        let result = repo.find_activation(&lookup, activation.id).await;
        assert_matches!(result, Err(ref e) if e.is_not_found());
        assert_matches!(result, Err(DbError::StaleKey { .. }));
    }

    #[tokio::test]
    async fn one_activation_per_email_and_type() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = UserRepository::new(&mut *conn, db.registry());

        repo.create_activation(PendingActivation::new(
            "jane@example.org",
            PendingActivationType::ResetPassword,
        ))
        .await
        .unwrap();
        let second = repo
            .create_activation(PendingActivation::new(
                "jane@example.org",
                PendingActivationType::ResetPassword,
            ))
            .await;
        assert_matches!(second, Err(DbError::ConstraintViolation(_)));

        repo.create_activation(PendingActivation::new(
            "jane@example.org",
            PendingActivationType::NewUser,
        ))
        .await
        .unwrap();
    }
}
