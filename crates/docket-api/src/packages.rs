//! Handlers for `/packages` draft endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/packages` | Optional `?kind=contract\|rate` |
//! | `POST`   | `/packages` | Body: `{"kind":..., "form":...}`; 201 + draft view |
//! | `GET`    | `/packages/:id` | 404 if not found |
//! | `PUT`    | `/packages/:id/draft` | Body: `{"form":...}` |
//! | `POST`   | `/packages/:id/links` | Body: `{"counterpart_id":...}` |
//! | `DELETE` | `/packages/:id/links/:counterpart_id` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use docket_core::{
  error::AsDomainError,
  history::DraftView,
  package::{Package, PackageKind},
  revision::FormData,
  store::PackageStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<PackageKind>,
}

/// `GET /packages[?kind=<kind>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Package>>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let packages = store
    .list_packages(params.kind)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(packages))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub kind: PackageKind,
  pub form: FormData,
}

/// `POST /packages` — body: `{"kind":"contract", "form":{...}}`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let view = store
    .create_package(body.kind, body.form)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(view)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /packages/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Package>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let package = store
    .get_package(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("package {id} not found")))?;
  Ok(Json(package))
}

// ─── Draft update ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateDraftBody {
  pub form: FormData,
}

/// `PUT /packages/:id/draft` — overwrite the draft revision's form.
pub async fn update_draft<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<UpdateDraftBody>,
) -> Result<Json<DraftView>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let view = store
    .update_draft(id, body.form)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(view))
}

// ─── Links ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LinkBody {
  pub counterpart_id: Uuid,
}

/// `POST /packages/:id/links` — body: `{"counterpart_id":"..."}`
pub async fn link<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<LinkBody>,
) -> Result<Json<DraftView>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let view = store
    .link_draft(id, body.counterpart_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(view))
}

/// `DELETE /packages/:id/links/:counterpart_id`
pub async fn unlink<S>(
  State(store): State<Arc<S>>,
  Path((id, counterpart_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DraftView>, ApiError>
where
  S: PackageStore,
  S::Error: AsDomainError,
{
  let view = store
    .unlink_draft(id, counterpart_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(view))
}
