use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    error::{AppError, AppResult},
    state::AppState,
};

/// Body shared by the deletion endpoints. Anything that does not parse is
/// treated as an empty body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub client_id: Option<String>,
}

impl DeleteRequest {
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    fn client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_files: Option<usize>,
}

fn parse_id(raw: &str, field: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::bad_request(format!("Invalid {field}")))
}

fn required_client_id(request: &DeleteRequest) -> AppResult<Uuid> {
    let raw = request
        .client_id()
        .ok_or_else(|| AppError::bad_request("Missing clientId"))?;
    parse_id(raw, "clientId")
}

pub async fn delete_file(
    State(state): State<AppState>,
    user: AdminUser,
    Path(file_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<DeleteResponse>> {
    let file_id = parse_id(&file_id, "fileId")?;
    let client_id = required_client_id(&DeleteRequest::from_body(&body))?;

    state
        .executor_for(&user)
        .delete_file(client_id, file_id)
        .await?;

    Ok(Json(DeleteResponse {
        ok: true,
        removed_files: None,
    }))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AdminUser,
    Path(document_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<DeleteResponse>> {
    let document_id = parse_id(&document_id, "docId")?;
    let client_id = required_client_id(&DeleteRequest::from_body(&body))?;

    let report = state
        .executor_for(&user)
        .delete_document(client_id, document_id)
        .await?;

    Ok(Json(DeleteResponse {
        ok: true,
        removed_files: Some(report.removed_files),
    }))
}

pub async fn delete_client(
    State(state): State<AppState>,
    user: AdminUser,
    Path(client_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<DeleteResponse>> {
    let client_id = parse_id(&client_id, "clientId")?;

    let request = DeleteRequest::from_body(&body);
    if let Some(raw) = request.client_id() {
        if Uuid::parse_str(raw).ok() != Some(client_id) {
            return Err(AppError::bad_request("clientId mismatch"));
        }
    }

    let report = state.executor_for(&user).delete_client(client_id).await?;

    Ok(Json(DeleteResponse {
        ok: true,
        removed_files: Some(report.removed_files),
    }))
}
