use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{connection::SimpleConnection, PgConnection};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness plus a round-trip to Postgres.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database_ok = state
        .db()
        .map(|mut conn| {
            let conn: &mut PgConnection = &mut conn;
            conn.batch_execute("SELECT 1").is_ok()
        })
        .unwrap_or(false);

    if database_ok {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        tracing::warn!("health check failed to reach the database");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}
