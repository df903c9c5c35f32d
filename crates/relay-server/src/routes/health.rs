use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /: liveness check.
pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "relay" }))
}

/// GET /health: liveness plus the number of runs in flight.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_runs": app.runner.cancellations().len(),
    }))
}
