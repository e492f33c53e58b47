//! Handlers for submit, unlock, and history endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/packages/:id/submit` | Body: `{"submitted_by":..., "reason":...}` |
//! | `POST` | `/packages/:id/unlock` | Body: `{"unlocked_by":..., "reason":...}` |
//! | `GET`  | `/packages/:id/history` | Full audit trail, most recent first |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use docket_core::{
  error::AsDomainError,
  history::{DraftView, PackageHistory},
  store::PackageStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Submit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub submitted_by: String,
  pub reason:       String,
}

/// `POST /packages/:id/submit` — returns the reconstructed full history.
///
/// 409 if the package has no draft or any linked counterpart is itself
/// still a draft; nothing is committed in either case.
pub async fn submit<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<PackageHistory>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let history = store
    .submit(id, body.submitted_by, body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(history))
}

// ─── Unlock ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UnlockBody {
  pub unlocked_by: String,
  pub reason:      String,
}

/// `POST /packages/:id/unlock` — reopen a submitted package for editing.
pub async fn unlock<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<UnlockBody>,
) -> Result<Json<DraftView>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let view = store
    .unlock(id, body.unlocked_by, body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(view))
}

// ─── History ──────────────────────────────────────────────────────────────────

/// `GET /packages/:id/history`
pub async fn history<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<PackageHistory>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let history = store
    .find_with_history(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(history))
}
