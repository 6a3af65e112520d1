//! HTTP-level tests for the page layout endpoints, run against the in-memory
//! store.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use common::{
    body_json, get, get_auth, post_json, put_json, put_json_auth, token_for, token_with_role,
};
use serde_json::{json, Value};
use shopfront_core::block::Block;
use shopfront_core::legacy::save_layout;
use shopfront_core::reorder::move_block;
use shopfront_persistence::{LayoutStore, MemoryLayoutStore};

const OWNER: i64 = 7;
const OTHER: i64 = 8;
const SUPPORT: i64 = 9;

fn rows(blocks: &[Block]) -> Value {
    serde_json::to_value(save_layout(blocks)).unwrap()
}

fn store_and_app() -> (Arc<MemoryLayoutStore>, axum::Router) {
    let store = Arc::new(MemoryLayoutStore::new());
    let app = common::build_test_app(store.clone());
    (store, app)
}

fn product(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Product {id}"),
        "price_cents": 1999,
        "created_at": "2024-05-01T00:00:00Z",
    })
}

// ---------------------------------------------------------------------------
// Layout storage
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_page_loads_empty_at_version_zero() {
    let (_store, app) = store_and_app();
    let response = get(app, "/api/v1/pages/1/layout").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"]["version"], 0);
    assert_eq!(json["data"]["rows"], json!({}));
}

#[tokio::test]
async fn first_save_claims_the_page_and_bumps_version() {
    let (store, app) = store_and_app();
    let body = json!({
        "rows": rows(&[Block::text("Welcome", Utc::now())]),
        "expected_version": 0,
    });

    let response = put_json_auth(app.clone(), "/api/v1/pages/1/layout", body, &token_for(OWNER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["version"], 1);
    assert_eq!(store.owner_of(1).await.unwrap(), Some(OWNER));

    let json = body_json(get(app, "/api/v1/pages/1/layout").await).await;
    assert_eq!(json["data"]["version"], 1);
    assert_eq!(json["data"]["rows"]["0"]["layout_type"], "text");
    assert_eq!(json["data"]["rows"]["0"]["content"], "Welcome");
}

#[tokio::test]
async fn stale_version_returns_409_and_keeps_stored_rows() {
    let (store, app) = store_and_app();
    store
        .insert_page(1, OWNER, save_layout(&[Block::banner("Stored", Utc::now())]), 3)
        .await;

    let body = json!({
        "rows": rows(&[Block::text("Mine", Utc::now())]),
        "expected_version": 2,
    });
    let response = put_json_auth(app, "/api/v1/pages/1/layout", body, &token_for(OWNER)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VERSION_CONFLICT");

    let stored = store.load(1).await.unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.rows[&0].layout_type.as_deref(), Some("banner"));
}

#[tokio::test]
async fn save_requires_a_token() {
    let (_store, app) = store_and_app();
    let body = json!({ "rows": {}, "expected_version": 0 });
    let response = put_json(app, "/api/v1/pages/1/layout", body).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn save_by_another_account_is_forbidden() {
    let (store, app) = store_and_app();
    store.insert_page(1, OWNER, save_layout(&[]), 1).await;

    let body = json!({ "rows": {}, "expected_version": 1 });
    let response = put_json_auth(app, "/api/v1/pages/1/layout", body, &token_for(OTHER)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(store.save_attempts(), 0);
}

#[tokio::test]
async fn admin_passes_the_owner_check_without_taking_the_page() {
    let (store, app) = store_and_app();
    store
        .insert_page(1, OWNER, save_layout(&[Block::text("a", Utc::now())]), 1)
        .await;
    let admin = token_with_role(SUPPORT, "admin");

    let response = get_auth(app.clone(), "/api/v1/pages/1/changes", &admin).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json!({ "rows": {}, "expected_version": 1 });
    let response = put_json_auth(app, "/api/v1/pages/1/layout", body, &admin).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.owner_of(1).await.unwrap(), Some(OWNER));
}

#[tokio::test]
async fn unmappable_rows_are_rejected() {
    let (store, app) = store_and_app();
    let body = json!({
        "rows": { "0": { "layout_type": "carousel" } },
        "expected_version": 0,
    });
    let response = put_json_auth(app, "/api/v1/pages/1/layout", body, &token_for(OWNER)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "LEGACY_MAPPING_ERROR");
    assert_eq!(store.save_attempts(), 0);
}

#[tokio::test]
async fn invalid_variant_parameters_are_rejected() {
    let (_store, app) = store_and_app();
    let body = json!({
        "rows": { "0": { "layout_type": "product_grid", "columns": 40 } },
        "expected_version": 0,
    });
    let response = put_json_auth(app, "/api/v1/pages/1/layout", body, &token_for(OWNER)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ---------------------------------------------------------------------------
// Read views
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocks_view_reports_rows_that_failed_to_map() {
    let (store, app) = store_and_app();
    let mut layout = save_layout(&[
        Block::text("a", Utc::now()),
        Block::list(Utc::now()),
    ]);
    layout.insert(
        5,
        serde_json::from_value(json!({ "layout_type": "slideshow" })).unwrap(),
    );
    store.insert_page(1, OWNER, layout, 2).await;

    let json = body_json(get(app, "/api/v1/pages/1/blocks").await).await;
    let data = &json["data"];
    assert_eq!(data["version"], 2);
    assert_eq!(data["complete"], false);
    assert_eq!(data["blocks"].as_array().unwrap().len(), 2);
    assert_eq!(data["errors"][0]["row"], 5);
    assert_eq!(data["errors"][0]["layout_type"], "slideshow");
}

#[tokio::test]
async fn render_partitions_products_across_grids() {
    let (store, app) = store_and_app();
    let mut first = Block::product_grid(Utc::now());
    let mut second = Block::product_grid(Utc::now());
    for block in [&mut first, &mut second] {
        if let shopfront_core::block::BlockData::ProductGrid(grid) = &mut block.data {
            grid.max_products = 2;
        }
    }
    store
        .insert_page(1, OWNER, save_layout(&[first, second]), 1)
        .await;

    let products: Vec<Value> = ["a", "b", "c", "d", "e"].into_iter().map(product).collect();
    let response = post_json(app, "/api/v1/pages/1/render", json!({ "products": products })).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let layouts = json["data"]["layouts"].as_array().unwrap();
    assert_eq!(layouts.len(), 2);
    let ids = |i: usize| -> Vec<String> {
        layouts[i]["body"]["products"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap().to_string())
            .collect()
    };
    let (a, b) = (ids(0), ids(1));
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 2);
    assert!(a.iter().all(|id| !b.contains(id)), "grids must not overlap");
    assert_eq!(layouts[0]["body"]["kind"], "product_grid");
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_log_is_recorded_and_owner_only() {
    let (store, app) = store_and_app();
    let now = Utc::now();
    let mut blocks = vec![
        Block::text("a", now).with_position(0),
        Block::banner("b", now).with_position(1),
        Block::list(now).with_position(2),
    ];
    let log = move_block(&mut blocks, 0, 2, now);

    let body = json!({
        "rows": rows(&blocks),
        "expected_version": 0,
        "change_log": log,
        "source": "drag_drop",
    });
    let response = put_json_auth(app.clone(), "/api/v1/pages/3/layout", body, &token_for(OWNER)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get_auth(app.clone(), "/api/v1/pages/3/changes", &token_for(OWNER)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), log.len());
    assert_eq!(entries[0]["source"], "drag_drop");
    assert_eq!(entries[0]["actor_id"], OWNER);
    assert_eq!(entries[0]["version"], 1);

    let limited = body_json(
        get_auth(app.clone(), "/api/v1/pages/3/changes?limit=1", &token_for(OWNER)).await,
    )
    .await;
    assert_eq!(limited["data"].as_array().unwrap().len(), 1);

    let response = get_auth(app.clone(), "/api/v1/pages/3/changes", &token_for(OTHER)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = get_auth(app, "/api/v1/pages/99/changes", &token_for(OWNER)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.save_attempts(), 1);
}
