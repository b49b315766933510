//! GraphQL schema tests: queries and mutations executed with per-request
//! loaders, without the HTTP layer

mod common;

use std::sync::Arc;

use async_graphql::{Request, Variables};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use common::test_db;
use stashbox::db::Database;
use stashbox::graphql::{StashboxSchema, build_schema};
use stashbox::loaders::{LoaderConfig, Loaders};

async fn execute(schema: &StashboxSchema, db: &Database, query: &str, variables: Value) -> Value {
    let loaders = Arc::new(Loaders::new(db, LoaderConfig::default()));
    execute_with(schema, loaders, query, variables).await
}

async fn execute_with(
    schema: &StashboxSchema,
    loaders: Arc<Loaders>,
    query: &str,
    variables: Value,
) -> Value {
    let request = Request::new(query)
        .variables(Variables::from_json(variables))
        .data(loaders);
    let response = schema.execute(request).await;
    assert!(response.errors.is_empty(), "errors: {:?}", response.errors);
    response.data.into_json().unwrap()
}

const CREATE: &str = r#"
    mutation Create($input: PerformerCreateInput!) {
        performerCreate(input: $input) { id name }
    }
"#;

async fn create(schema: &StashboxSchema, db: &Database, input: Value) -> String {
    let data = execute(schema, db, CREATE, json!({ "input": input })).await;
    data["performerCreate"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn find_performers_resolves_relations() {
    let db = test_db().await;
    let schema = build_schema(db.clone());

    let jane = create(
        &schema,
        &db,
        json!({
            "name": "Jane",
            "aliases": ["J", "Janey"],
            "gender": "FEMALE",
            "urls": [{ "url": "https://example.com/jane", "type": "HOME" }],
            "measurements": { "cupSize": "C", "bandSize": 34, "waist": 0 },
            "tattoos": [{ "location": "arm", "description": "rose" }],
        }),
    )
    .await;
    let john = create(&schema, &db, json!({ "name": "John" })).await;

    let data = execute(
        &schema,
        &db,
        r#"
            query Find($ids: [UUID!]!) {
                findPerformers(ids: $ids) {
                    name
                    aliases
                    gender
                    urls { url type }
                    measurements { cupSize bandSize waist hip }
                    tattoos { location description }
                    piercings { location }
                    images { url }
                }
            }
        "#,
        json!({ "ids": [john, jane, "00000000-0000-0000-0000-000000000000"] }),
    )
    .await;

    assert_eq!(
        data,
        json!({
            "findPerformers": [
                {
                    "name": "John",
                    "aliases": [],
                    "gender": null,
                    "urls": [],
                    "measurements": { "cupSize": null, "bandSize": null, "waist": null, "hip": null },
                    "tattoos": [],
                    "piercings": [],
                    "images": [],
                },
                {
                    "name": "Jane",
                    "aliases": ["J", "Janey"],
                    "gender": "FEMALE",
                    "urls": [{ "url": "https://example.com/jane", "type": "HOME" }],
                    "measurements": { "cupSize": "C", "bandSize": 34, "waist": null, "hip": null },
                    "tattoos": [{ "location": "arm", "description": "rose" }],
                    "piercings": [],
                    "images": [],
                },
                null,
            ]
        })
    );
}

#[tokio::test]
async fn update_replaces_only_supplied_relations() {
    let db = test_db().await;
    let schema = build_schema(db.clone());

    let id = create(
        &schema,
        &db,
        json!({
            "name": "Jane",
            "aliases": ["old"],
            "urls": [{ "url": "https://example.com/jane", "type": "HOME" }],
        }),
    )
    .await;

    let data = execute(
        &schema,
        &db,
        r#"
            mutation Update($input: PerformerUpdateInput!) {
                performerUpdate(input: $input) { name aliases urls { url } }
            }
        "#,
        json!({ "input": { "id": id, "aliases": ["new", "newer"] } }),
    )
    .await;

    assert_eq!(
        data,
        json!({
            "performerUpdate": {
                "name": "Jane",
                "aliases": ["new", "newer"],
                "urls": [{ "url": "https://example.com/jane" }],
            }
        })
    );
}

#[tokio::test]
async fn destroyed_performer_resolves_null() {
    let db = test_db().await;
    let schema = build_schema(db.clone());
    let id = create(&schema, &db, json!({ "name": "Gone" })).await;

    let data = execute(
        &schema,
        &db,
        "mutation Destroy($id: UUID!) { performerDestroy(id: $id) }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(data, json!({ "performerDestroy": true }));

    let data = execute(
        &schema,
        &db,
        "query Find($id: UUID!) { findPerformer(id: $id) { name } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(data, json!({ "findPerformer": null }));
}

#[tokio::test]
async fn birthdate_keeps_its_accuracy() {
    let db = test_db().await;
    let schema = build_schema(db.clone());
    let id = create(
        &schema,
        &db,
        json!({
            "name": "Jane",
            "birthdate": { "date": "1990-06", "accuracy": "MONTH" },
        }),
    )
    .await;

    let data = execute(
        &schema,
        &db,
        "query Find($id: UUID!) { findPerformer(id: $id) { birthdate { date accuracy } } }",
        json!({ "id": id }),
    )
    .await;
    assert_eq!(
        data,
        json!({ "findPerformer": { "birthdate": { "date": "1990-06", "accuracy": "MONTH" } } })
    );
}

#[tokio::test]
async fn listing_performers_dispatches_one_fetch_per_relation() {
    let db = test_db().await;
    let schema = build_schema(db.clone());

    let mut ids = Vec::new();
    for i in 0..30 {
        ids.push(
            create(
                &schema,
                &db,
                json!({
                    "name": format!("Performer {}", i),
                    "aliases": [format!("alias {}", i)],
                    "tattoos": [{ "location": "arm" }],
                }),
            )
            .await,
        );
    }

    let loaders = Arc::new(Loaders::new(&db, LoaderConfig::default()));
    let data = execute_with(
        &schema,
        loaders.clone(),
        r#"
            query Find($ids: [UUID!]!) {
                findPerformers(ids: $ids) {
                    name
                    aliases
                    tattoos { location }
                    images { url }
                }
            }
        "#,
        json!({ "ids": ids }),
    )
    .await;

    let performers = data["findPerformers"].as_array().unwrap();
    assert_eq!(performers.len(), 30);
    assert_eq!(performers[7]["aliases"], json!(["alias 7"]));

    let batches = [
        loaders.performer_by_id.stats().batches(),
        loaders.performer_aliases_by_id.stats().batches(),
        loaders.performer_tattoos_by_id.stats().batches(),
        loaders.performer_image_ids_by_id.stats().batches(),
    ];
    assert_eq!(batches, [1, 1, 1, 1]);
    assert_eq!(loaders.performer_aliases_by_id.stats().keys(), 30);

    // No performer has images, so the image fetch is never dispatched
    assert_eq!(loaders.image_by_id.stats().batches(), 0);
    assert_eq!(loaders.performer_urls_by_id.stats().batches(), 0);
}
