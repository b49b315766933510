//! Performer writes and reads, scoped to a caller-supplied connection
//!
//! Every method runs on the connection the repository was built with. Pass an
//! open transaction so that a performer and its join collections are written
//! all-or-nothing; the caller commits or rolls back.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use super::error::{DbError, DbResult};
use super::orm::{QueryBuilder, TableRegistry};
use crate::models::{
    BodyModificationInput, PERFORMER_ALIASES, PERFORMER_IMAGES, PERFORMER_PIERCINGS,
    PERFORMER_TABLE, PERFORMER_TATTOOS, PERFORMER_URLS, Performer, PerformerAliases,
    PerformerBodyMods, PerformerCreateInput, PerformerImages, PerformerUpdateInput, PerformerUrls,
    UrlInput,
};

pub struct PerformerRepository<'c> {
    qb: QueryBuilder<'c>,
}

/// Join collections carried by a create or update input
struct JoinInputs<'a> {
    aliases: Option<&'a [String]>,
    urls: Option<&'a [UrlInput]>,
    tattoos: Option<&'a [BodyModificationInput]>,
    piercings: Option<&'a [BodyModificationInput]>,
    image_ids: Option<&'a [Uuid]>,
}

impl<'c> PerformerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection, registry: &'c TableRegistry) -> Self {
        Self {
            qb: QueryBuilder::new(conn, registry),
        }
    }

    pub async fn find(&mut self, id: Uuid) -> DbResult<Option<Performer>> {
        self.qb.find(id).await
    }

    pub async fn find_with_deleted(&mut self, id: Uuid) -> DbResult<Option<Performer>> {
        self.qb.find_with_deleted(id).await
    }

    pub async fn aliases(&mut self, id: Uuid) -> DbResult<PerformerAliases> {
        self.qb.find_joins(&PERFORMER_ALIASES, id).await
    }

    pub async fn urls(&mut self, id: Uuid) -> DbResult<PerformerUrls> {
        self.qb.find_joins(&PERFORMER_URLS, id).await
    }

    pub async fn tattoos(&mut self, id: Uuid) -> DbResult<PerformerBodyMods> {
        self.qb.find_joins(&PERFORMER_TATTOOS, id).await
    }

    pub async fn piercings(&mut self, id: Uuid) -> DbResult<PerformerBodyMods> {
        self.qb.find_joins(&PERFORMER_PIERCINGS, id).await
    }

    pub async fn images(&mut self, id: Uuid) -> DbResult<PerformerImages> {
        self.qb.find_joins(&PERFORMER_IMAGES, id).await
    }

    /// Insert a performer and every join collection the input carries
    pub async fn create(&mut self, input: &PerformerCreateInput) -> DbResult<Performer> {
        let mut performer = Performer::default();
        performer.copy_from_create_input(input);
        let performer = self.qb.create(performer).await?;

        self.write_joins(
            performer.id,
            JoinInputs {
                aliases: input.aliases.as_deref(),
                urls: input.urls.as_deref(),
                tattoos: input.tattoos.as_deref(),
                piercings: input.piercings.as_deref(),
                image_ids: input.image_ids.as_deref(),
            },
        )
        .await?;

        info!(performer_id = %performer.id, name = %performer.name, "Created performer");
        Ok(performer)
    }

    /// Merge `input` into the stored performer. A join collection present in
    /// the input replaces the stored one as a unit; absent ones are kept.
    pub async fn update(&mut self, input: &PerformerUpdateInput) -> DbResult<Performer> {
        let mut performer: Performer = self
            .qb
            .find(input.id)
            .await?
            .ok_or_else(|| DbError::not_found(PERFORMER_TABLE.name, input.id))?;

        performer.copy_from_update_input(input);
        performer.updated_at = Utc::now();
        let performer = self.qb.update(performer).await?;

        self.write_joins(
            performer.id,
            JoinInputs {
                aliases: input.aliases.as_deref(),
                urls: input.urls.as_deref(),
                tattoos: input.tattoos.as_deref(),
                piercings: input.piercings.as_deref(),
                image_ids: input.image_ids.as_deref(),
            },
        )
        .await?;

        info!(performer_id = %performer.id, "Updated performer");
        Ok(performer)
    }

    /// Soft delete. Join rows stay so the history remains readable.
    pub async fn destroy(&mut self, id: Uuid) -> DbResult<()> {
        self.qb.destroy::<Performer>(id).await?;
        info!(performer_id = %id, "Destroyed performer");
        Ok(())
    }

    async fn write_joins(&mut self, id: Uuid, joins: JoinInputs<'_>) -> DbResult<()> {
        if let Some(aliases) = joins.aliases {
            self.qb
                .replace_joins(
                    &PERFORMER_ALIASES,
                    id,
                    &PerformerAliases::from_aliases(id, aliases),
                )
                .await?;
        }
        if let Some(urls) = joins.urls {
            self.qb
                .replace_joins(&PERFORMER_URLS, id, &PerformerUrls::from_inputs(id, urls))
                .await?;
        }
        if let Some(tattoos) = joins.tattoos {
            self.qb
                .replace_joins(
                    &PERFORMER_TATTOOS,
                    id,
                    &PerformerBodyMods::from_inputs(id, tattoos),
                )
                .await?;
        }
        if let Some(piercings) = joins.piercings {
            self.qb
                .replace_joins(
                    &PERFORMER_PIERCINGS,
                    id,
                    &PerformerBodyMods::from_inputs(id, piercings),
                )
                .await?;
        }
        if let Some(image_ids) = joins.image_ids {
            self.qb
                .replace_joins(
                    &PERFORMER_IMAGES,
                    id,
                    &PerformerImages::from_ids(id, image_ids),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{self, Image};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        let db = Database::in_memory(models::registry()).await.unwrap();
        db.sync_schema().await.unwrap();
        db
    }

    fn input(name: &str, aliases: &[&str]) -> PerformerCreateInput {
        PerformerCreateInput {
            name: name.to_string(),
            aliases: Some(aliases.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_writes_joins_in_order() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let mut repo = PerformerRepository::new(&mut *tx, db.registry());

        let performer = repo.create(&input("Jane", &["c", "a", "b"])).await.unwrap();
        let aliases = repo.aliases(performer.id).await.unwrap();
        assert_eq!(aliases.to_aliases(), vec!["c", "a", "b"]);

        drop(repo);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn rolled_back_create_leaves_nothing() {
        let db = setup().await;
        let image_id = Uuid::new_v4();

        let mut tx = db.begin().await.unwrap();
        let mut repo = PerformerRepository::new(&mut *tx, db.registry());
        let result = repo
            .create(&PerformerCreateInput {
                name: "Jane".to_string(),
                aliases: Some(vec!["a".to_string()]),
                image_ids: Some(vec![image_id]),
                ..Default::default()
            })
            .await;
        assert_matches!(result, Err(DbError::ConstraintViolation(_)));
        drop(repo);
        tx.rollback().await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM performer_aliases")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn update_replaces_only_supplied_collections() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = PerformerRepository::new(&mut *conn, db.registry());

        let performer = repo
            .create(&PerformerCreateInput {
                urls: Some(vec![UrlInput {
                    url: "https://example.org/jane".to_string(),
                    url_type: "HOME".to_string(),
                }]),
                ..input("Jane", &["a", "b"])
            })
            .await
            .unwrap();

        let updated = repo
            .update(&PerformerUpdateInput {
                id: performer.id,
                aliases: Some(vec!["z".to_string()]),
                country: Some("NL".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.name, "Jane");
        assert_eq!(updated.country.as_deref(), Some("NL"));
        assert_eq!(repo.aliases(performer.id).await.unwrap().to_aliases(), vec!["z"]);
        assert_eq!(repo.urls(performer.id).await.unwrap().0.len(), 1);
    }

    #[tokio::test]
    async fn destroyed_performers_are_hidden() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut qb = QueryBuilder::new(&mut *conn, db.registry());
        let image = qb.create(Image::new("https://img/1.jpg")).await.unwrap();
        drop(qb);

        let mut repo = PerformerRepository::new(&mut *conn, db.registry());
        let performer = repo
            .create(&PerformerCreateInput {
                image_ids: Some(vec![image.id]),
                ..input("Jane", &[])
            })
            .await
            .unwrap();

        repo.destroy(performer.id).await.unwrap();

        assert_eq!(repo.find(performer.id).await.unwrap(), None);
        let stored = repo.find_with_deleted(performer.id).await.unwrap().unwrap();
        assert!(stored.deleted);

        assert_matches!(repo.destroy(performer.id).await, Err(DbError::NotFound { .. }));
        assert_matches!(
            repo.update(&PerformerUpdateInput {
                id: performer.id,
                ..Default::default()
            })
            .await,
            Err(DbError::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn joins_need_a_live_parent() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut repo = PerformerRepository::new(&mut *conn, db.registry());

        let performer = repo.create(&input("Jane", &[])).await.unwrap();
        repo.destroy(performer.id).await.unwrap();
        drop(repo);

        let mut qb = QueryBuilder::new(&mut *conn, db.registry());
        let result = qb
            .create_joins(
                &PERFORMER_ALIASES,
                &PerformerAliases::from_aliases(performer.id, &["late".to_string()]),
            )
            .await;
        assert_matches!(result, Err(DbError::ConstraintViolation(_)));
    }
}
