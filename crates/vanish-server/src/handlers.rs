use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    error::VaultError,
    store::{NewSecret, SecretRecord},
    AppState,
};

// ── Error mapping ─────────────────────────────────────────────────────────────

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        match self {
            VaultError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            VaultError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "Secret not found"})),
            )
                .into_response(),
            VaultError::Storage(e) => {
                tracing::error!(error = %format!("{e:#}"), "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal server error"})),
                )
                    .into_response()
            }
        }
    }
}

// ── Liveness ──────────────────────────────────────────────────────────────────

pub async fn root() -> impl IntoResponse {
    Json(json!({"message": "Vanish secret drop is running"}))
}

/// Unauthenticated, so it reports store reachability only, never contents.
pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, VaultError> {
    state.vault.count()?;
    Ok(Json(json!({"status": "ok"})))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Base64 (standard alphabet) ciphertext.
    pub encrypted_data: String,
    pub iv: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    /// Time-to-live in seconds.
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub id: String,
    pub message: String,
    pub expires_at: String,
}

pub async fn create_secret(
    State(state): State<AppState>,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateResponse>), VaultError> {
    let Json(body) = body.map_err(|e| VaultError::Validation(e.body_text()))?;

    let ciphertext = STANDARD
        .decode(body.encrypted_data.trim())
        .map_err(|e| {
            VaultError::Validation(format!("encrypted_data is not valid base64: {e}"))
        })?;

    let admission = state.vault.admit(NewSecret {
        ciphertext,
        iv: body.iv,
        filename: body.filename,
        content_type: body.content_type,
        size: body.file_size,
        ttl_seconds: body.expires_in,
    })?;

    info!(
        ttl_seconds = ?body.expires_in,
        expires_at_ms = admission.expires_at,
        "secret created"
    );
    debug!(id = %admission.id, "secret created");

    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            id: admission.id,
            message: "Secret created successfully".into(),
            expires_at: rfc3339(admission.expires_at),
        }),
    ))
}

// ── Consume ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SecretResponse {
    pub id: String,
    /// Base64 (standard alphabet) ciphertext, exactly as submitted.
    pub encrypted_data: String,
    pub iv: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<u64>,
    pub created_at: String,
    pub expires_at: String,
    pub expires_in: u64,
}

impl From<&SecretRecord> for SecretResponse {
    fn from(r: &SecretRecord) -> Self {
        Self {
            id: r.id.clone(),
            encrypted_data: STANDARD.encode(&r.ciphertext),
            iv: r.iv.clone(),
            filename: r.filename.clone(),
            content_type: r.content_type.clone(),
            file_size: r.size,
            created_at: rfc3339(r.created_at),
            expires_at: rfc3339(r.expires_at),
            expires_in: r.ttl_seconds,
        }
    }
}

pub async fn get_secret(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SecretResponse>, VaultError> {
    let record = state.vault.consume(&id)?;
    info!("secret viewed and destroyed");
    Ok(Json(SecretResponse::from(&record)))
}

// ── Prune ─────────────────────────────────────────────────────────────────────

pub async fn prune_secrets(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, VaultError> {
    let pruned = state.vault.sweep()?;
    info!(pruned = pruned.len(), "manual prune");
    Ok(Json(json!({"pruned": pruned.len()})))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn rfc3339(unix_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(unix_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_as_utc_rfc3339() {
        assert_eq!(rfc3339(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(rfc3339(1_700_000_000_000), "2023-11-14T22:13:20.000Z");
        assert_eq!(rfc3339(1_700_000_000_950), "2023-11-14T22:13:20.950Z");
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = VaultError::NotFound.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn storage_failure_hides_detail() {
        let resp = VaultError::Storage(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"internal server error"}"#);
    }
}
