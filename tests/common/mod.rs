#![allow(dead_code)]

pub mod providers;

use std::sync::Once;

use axum::{body::Body, http::Request, response::Response, Router};
use fundchamps::{
    config::Config,
    create_app,
    entities::{campaign_goal, sponsor, team},
    AppState,
};
use http_body_util::BodyExt;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use tower::ServiceExt;

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Fresh in-memory SQLite with every migration applied. A single pooled
/// connection keeps the database alive for the whole test.
pub async fn test_db() -> DatabaseConnection {
    setup();
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn test_state(config: Config) -> AppState {
    AppState::new(test_db().await, config)
}

pub fn app(state: &AppState) -> Router {
    create_app(state.clone())
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn post_form(app: Router, uri: &str, body: &str) -> Response {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn insert_team(db: &DatabaseConnection, name: &str) -> team::Model {
    team::ActiveModel {
        slug: Set(team::slugify(name)),
        team_name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_goal(db: &DatabaseConnection, team_id: i32, goal_cents: i64) -> campaign_goal::Model {
    campaign_goal::ActiveModel {
        team_id: Set(team_id),
        goal_amount: Set(goal_cents),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}

pub async fn insert_sponsor(
    db: &DatabaseConnection,
    name: &str,
    team_id: Option<i32>,
    cents: i64,
    status: &str,
) -> sponsor::Model {
    sponsor::ActiveModel {
        name: Set(name.to_string()),
        email: Set(Some(format!("{}@example.org", team::slugify(name)))),
        team_id: Set(team_id),
        amount: Set(cents),
        status: Set(status.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
}
