use async_graphql::{Context, Object, Result};
use uuid::Uuid;

use super::loaders;
use crate::db::Database;
use crate::db::performers::PerformerRepository;
use crate::models::{Performer, PerformerCreateInput, PerformerUpdateInput};

#[derive(Default)]
pub struct PerformerMutations;

#[Object]
impl PerformerMutations {
    /// Create a performer together with its aliases, urls, body modifications
    /// and images
    async fn performer_create(
        &self,
        ctx: &Context<'_>,
        input: PerformerCreateInput,
    ) -> Result<Performer> {
        let db = ctx.data::<Database>()?;
        let mut tx = db.begin().await?;
        let performer = PerformerRepository::new(&mut *tx, db.registry())
            .create(&input)
            .await?;
        tx.commit().await?;

        loaders(ctx)?.clear_performer(performer.id);
        Ok(performer)
    }

    async fn performer_update(
        &self,
        ctx: &Context<'_>,
        input: PerformerUpdateInput,
    ) -> Result<Performer> {
        let db = ctx.data::<Database>()?;
        let mut tx = db.begin().await?;
        let performer = PerformerRepository::new(&mut *tx, db.registry())
            .update(&input)
            .await?;
        tx.commit().await?;

        loaders(ctx)?.clear_performer(performer.id);
        Ok(performer)
    }

    async fn performer_destroy(&self, ctx: &Context<'_>, id: Uuid) -> Result<bool> {
        let db = ctx.data::<Database>()?;
        let mut tx = db.begin().await?;
        PerformerRepository::new(&mut *tx, db.registry())
            .destroy(id)
            .await?;
        tx.commit().await?;

        loaders(ctx)?.clear_performer(id);
        Ok(true)
    }
}
