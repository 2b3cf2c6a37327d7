use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::response::json_error;
use crate::http::server::AppState;
use crate::keys::{KeyId, KeyRecord, Lifetime, StoreError};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKeyRequest {
    pub region: String,
    pub lifetime: u64,
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    BadRequest(String),

    #[error("key {0} not found")]
    NotFound(KeyId),

    #[error("key store failure: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Store(e) => {
                tracing::error!(error = %e, "Key store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        json_error(status, self.to_string())
    }
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn list_keys(State(state): State<AppState>) -> Result<Json<Vec<KeyRecord>>, AdminError> {
    Ok(Json(state.keys.list_all().await?))
}

pub async fn create_key(
    State(state): State<AppState>,
    payload: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyRecord>), AdminError> {
    let Json(payload) = payload.map_err(|e| AdminError::BadRequest(e.body_text()))?;

    let region = payload.region.trim();
    if region.is_empty() {
        return Err(AdminError::BadRequest("region must not be empty".into()));
    }
    let lifetime = Lifetime::try_from(payload.lifetime)
        .map_err(|e| AdminError::BadRequest(e.to_string()))?;

    let record = state.keys.create(region, lifetime).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AdminError> {
    let id: KeyId = id
        .parse()
        .map_err(|_| AdminError::BadRequest(format!("malformed key id: {}", id)))?;

    if state.keys.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AdminError::NotFound(id))
    }
}
