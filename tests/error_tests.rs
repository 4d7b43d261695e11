use axum::{http::StatusCode, response::IntoResponse};
use fundchamps::error::AppError;
use http_body_util::BodyExt;
use sea_orm::DbErr;
use serde_json::Value;

async fn envelope(error: AppError) -> (StatusCode, Value) {
    let response = error.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[test]
fn display_messages() {
    assert_eq!(AppError::NotFound("Team nope".into()).to_string(), "Team nope not found");
    assert_eq!(AppError::Unauthorized.to_string(), "Missing or invalid bearer token");
    assert_eq!(
        AppError::bad_request("invalid_amount", "Minimum is $1.00").to_string(),
        "Minimum is $1.00"
    );
    let db = AppError::Database(DbErr::Custom("boom".into())).to_string();
    assert!(db.starts_with("Database error: "));
    assert!(db.contains("boom"));
}

#[test]
fn status_codes() {
    assert_eq!(AppError::bad_request("x", "y").status(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden("sig".into()).status(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::config("stripe_config", "missing").status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(AppError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn client_errors_carry_code_and_message() {
    let (status, body) = envelope(AppError::bad_request("invalid_goal", "goal_amount must be a non-negative number")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_goal");
    assert_eq!(body["message"], "goal_amount must be a non-negative number");

    let (status, body) = envelope(AppError::Forbidden("Invalid Twilio signature".into())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (_, body) = envelope(AppError::config("webhook_config", "Stripe webhook secret is not configured")).await;
    assert_eq!(body["error"], "webhook_config");
    assert_eq!(body["message"], "Stripe webhook secret is not configured");
}

#[tokio::test]
async fn server_errors_hide_details() {
    let (status, body) = envelope(AppError::Database(DbErr::Custom("password=hunter2".into()))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "database_error");
    assert_eq!(body["message"], "could not process");

    let (_, body) = envelope(AppError::Internal("stack trace".into())).await;
    assert_eq!(body["error"], "internal_error");
    assert_eq!(body["message"], "internal error");
}

#[test]
fn db_errors_convert() {
    fn lookup() -> fundchamps::error::Result<()> {
        Err(DbErr::RecordNotFound("sponsor".into()))?;
        Ok(())
    }
    assert!(matches!(lookup(), Err(AppError::Database(_))));
}
