//! JSON REST API for Docket.
//!
//! Exposes an axum [`Router`] backed by any
//! [`docket_core::store::PackageStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", docket_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod lifecycle;
pub mod packages;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use docket_core::{error::AsDomainError, store::PackageStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: PackageStore + 'static,
  S::Error: AsDomainError,
{
  Router::new()
    // Packages and drafts
    .route("/packages", get(packages::list::<S>).post(packages::create::<S>))
    .route("/packages/{id}", get(packages::get_one::<S>))
    .route("/packages/{id}/draft", put(packages::update_draft::<S>))
    .route("/packages/{id}/links", post(packages::link::<S>))
    .route(
      "/packages/{id}/links/{counterpart_id}",
      delete(packages::unlink::<S>),
    )
    // Lifecycle
    .route("/packages/{id}/submit", post(lifecycle::submit::<S>))
    .route("/packages/{id}/unlock", post(lifecycle::unlock::<S>))
    .route("/packages/{id}/history", get(lifecycle::history::<S>))
    .with_state(store)
}

// ─── Integration tests ────────────────────────────────────────────────────────
