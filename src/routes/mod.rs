pub mod auth;
pub mod chat;
pub mod convert;
pub mod documents;

use axum::Json;
use std::time::Duration;

use crate::convert::ops::Converter;
use crate::ingestion::DocumentReconciler;
use crate::AppState;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub(crate) fn reconciler(state: &AppState) -> DocumentReconciler {
    DocumentReconciler::new(state.db.clone(), state.storage.clone())
}

pub(crate) fn converter(state: &AppState) -> Converter {
    Converter::new(
        state.config.tools.clone(),
        Duration::from_secs(state.config.conversion_timeout_seconds),
    )
}
