use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub some_data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedMessage {
    pub id: Uuid,
    pub some_data: String,
}

/// Calls seen so far per flaky key.
pub type Attempts = Arc<RwLock<HashMap<String, u32>>>;

pub fn app() -> Router {
    let attempts: Attempts = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/api/v1/recommended-response", get(recommended_response))
        .route("/api/v1/additional-response", get(additional_response))
        .route("/api/v1/save-message", post(save_message))
        .route("/api/v1/plain", get(plain))
        .route("/api/v1/echo-query", get(echo_query))
        .route("/api/v1/echo-header/{name}", get(echo_header))
        .route("/status/{code}", get(status).post(status))
        .route("/flaky/{key}/{failures}", get(flaky))
        .with_state(attempts)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn recommended_response() -> Json<Value> {
    Json(json!({ "recommended_response": "recommended msg" }))
}

async fn additional_response() -> Json<Value> {
    Json(json!({ "additional_response": "additional msg" }))
}

async fn save_message(Json(input): Json<Message>) -> (StatusCode, Json<SavedMessage>) {
    let saved = SavedMessage {
        id: Uuid::new_v4(),
        some_data: format!("{} Appended", input.some_data),
    };
    (StatusCode::CREATED, Json(saved))
}

async fn plain() -> &'static str {
    "plain text body"
}

async fn echo_query(RawQuery(query): RawQuery) -> String {
    query.unwrap_or_default()
}

async fn echo_header(Path(name): Path<String>, headers: HeaderMap) -> Result<String, StatusCode> {
    let values: Vec<&str> = headers
        .get_all(name.as_str())
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    if values.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(values.join(","))
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let code = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((code, Json(json!({ "status": code.as_u16() }))))
}

/// Answer 503 for the first `failures` calls with `key`, then 200.
async fn flaky(
    State(attempts): State<Attempts>,
    Path((key, failures)): Path<(String, u32)>,
) -> (StatusCode, Json<Value>) {
    let mut attempts = attempts.write().await;
    let seen = attempts.entry(key.clone()).or_insert(0);
    *seen += 1;
    debug!(%key, attempt = *seen, failures, "flaky call");
    if *seen <= failures {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "attempt": *seen })))
    } else {
        (StatusCode::OK, Json(json!({ "attempt": *seen })))
    }
}
