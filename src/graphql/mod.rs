//! GraphQL API
//!
//! Resolvers never query the store for relations directly; they go through
//! the per-request [`Loaders`] attached to each request by the HTTP handler.
//! The handler keeps its own `Arc` so per-relation stats stay readable after
//! execution.

mod mutations;
mod performer;
mod queries;

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, MergedObject, Schema};

use crate::db::Database;
use crate::loaders::Loaders;

pub use mutations::PerformerMutations;
pub use queries::PerformerQueries;

#[derive(MergedObject, Default)]
pub struct QueryRoot(PerformerQueries);

#[derive(MergedObject, Default)]
pub struct MutationRoot(PerformerMutations);

/// The GraphQL schema type
pub type StashboxSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Build the GraphQL schema. Loaders are not part of the schema data; each
/// request brings its own.
pub fn build_schema(db: Database) -> StashboxSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(db)
        .finish()
}

/// The request's loaders, attached as `Arc<Loaders>` request data
pub(crate) fn loaders<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Loaders> {
    Ok(ctx.data::<Arc<Loaders>>()?.as_ref())
}
