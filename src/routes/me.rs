use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AdminUser;

#[derive(Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Echoes the identity behind the bearer token once it passed the guard.
pub async fn me(user: AdminUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.identity.id,
        email: user.identity.email,
    })
}
