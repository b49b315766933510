use async_graphql::{Context, Object, Result};
use uuid::Uuid;

use super::loaders;
use crate::models::Performer;

#[derive(Default)]
pub struct PerformerQueries;

#[Object]
impl PerformerQueries {
    /// A single performer, or null if it does not exist or was deleted
    async fn find_performer(&self, ctx: &Context<'_>, id: Uuid) -> Result<Option<Performer>> {
        Ok(loaders(ctx)?.performer_by_id.load(id).await?)
    }

    /// One entry per requested id, in request order
    async fn find_performers(
        &self,
        ctx: &Context<'_>,
        ids: Vec<Uuid>,
    ) -> Result<Vec<Option<Performer>>> {
        let results = loaders(ctx)?.performer_by_id.load_all(&ids).await;
        Ok(results.into_iter().collect::<Result<Vec<_>, _>>()?)
    }
}
