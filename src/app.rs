//! Application state and HTTP router construction.

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::{Json, Router};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::Database;
use crate::graphql::{StashboxSchema, build_schema};
use crate::loaders::{LoaderConfig, Loaders};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub schema: StashboxSchema,
    pub loader_config: LoaderConfig,
}

impl AppState {
    pub fn new(db: Database, loader_config: LoaderConfig) -> Self {
        Self {
            schema: build_schema(db.clone()),
            db,
            loader_config,
        }
    }
}

/// Build the full Axum router: /graphql plus layers.
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GraphiQL playground for browsers; other GET requests are rejected
async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if accepts_html {
        Html(GraphiQLSource::build().endpoint("/graphql").finish()).into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(serde_json::json!({
                "error": "GET requests are not supported for GraphQL queries. Use POST with Content-Type: application/json"
            })),
        )
            .into_response()
    }
}

/// Every request gets fresh loaders; they are dropped with the request.
async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    let loaders = Arc::new(Loaders::new(&state.db, state.loader_config));
    let request = req.into_inner().data(loaders.clone());
    let response = state.schema.execute(request).await;
    tracing::debug!(
        performers = loaders.performer_by_id.stats().batches(),
        aliases = loaders.performer_aliases_by_id.stats().batches(),
        images = loaders.image_by_id.stats().batches(),
        "GraphQL request batches"
    );
    response.into()
}
