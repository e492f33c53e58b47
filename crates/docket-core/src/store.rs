//! The `PackageStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `docket-store-sqlite`).
//! Higher layers (`docket-api`, `docket-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  history::{DraftView, PackageHistory},
  package::{Package, PackageKind},
  revision::FormData,
};

/// Abstraction over a Docket submission-package store backend.
///
/// Revisions and activated links are append-only; draft edits mutate only
/// the one unsubmitted draft revision and its pending links. Submit and
/// unlock are each a single transaction: either every row mutation commits
/// or none does.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait PackageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Packages and drafts ───────────────────────────────────────────────

  /// Create a package of `kind` with its initial draft revision.
  /// Assigns the next state number for the kind. Errors if the form kind
  /// does not match `kind`.
  fn create_package(
    &self,
    kind: PackageKind,
    form: FormData,
  ) -> impl Future<Output = Result<DraftView, Self::Error>> + Send + '_;

  /// Retrieve a package envelope by id. Returns `None` if not found.
  fn get_package(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Package>, Self::Error>> + Send + '_;

  /// List all packages, optionally filtered by kind.
  fn list_packages(
    &self,
    kind: Option<PackageKind>,
  ) -> impl Future<Output = Result<Vec<Package>, Self::Error>> + Send + '_;

  /// Overwrite the draft revision's form fields in place. No new rows.
  fn update_draft(
    &self,
    id: Uuid,
    form: FormData,
  ) -> impl Future<Output = Result<DraftView, Self::Error>> + Send + '_;

  /// Create (or re-point) a pending link from the draft to the counterpart
  /// package's latest revision. Linking to a counterpart whose latest
  /// revision is itself a draft is allowed; submit rejects it later.
  fn link_draft(
    &self,
    id: Uuid,
    counterpart_id: Uuid,
  ) -> impl Future<Output = Result<DraftView, Self::Error>> + Send + '_;

  /// Delete the draft's pending link to `counterpart_id`.
  fn unlink_draft(
    &self,
    id: Uuid,
    counterpart_id: Uuid,
  ) -> impl Future<Output = Result<DraftView, Self::Error>> + Send + '_;

  // ── Submit / unlock ───────────────────────────────────────────────────

  /// Submit the draft: stamp it with submit attribution, activate its
  /// pending links at the submit instant, record removal markers for
  /// counterparts dropped since the previous submitted revision, and close
  /// the previous revision's open links. Fails without committing anything
  /// if any linked counterpart is still a draft.
  ///
  /// Returns the freshly reconstructed full history.
  fn submit(
    &self,
    id: Uuid,
    submitted_by: String,
    reason: String,
  ) -> impl Future<Output = Result<PackageHistory, Self::Error>> + Send + '_;

  /// Unlock a submitted package: create a new draft revision copying the
  /// prior revision's form, with unlock attribution, inheriting pending
  /// links to every counterpart revision valid at this instant.
  fn unlock(
    &self,
    id: Uuid,
    unlocked_by: String,
    reason: String,
  ) -> impl Future<Output = Result<DraftView, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Reconstruct the package's full audit trail: every logical revision,
  /// most recent first, with the unsubmitted draft (if any) reported
  /// separately.
  fn find_with_history(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<PackageHistory, Self::Error>> + Send + '_;
}
