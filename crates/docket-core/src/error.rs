//! Error types for `docket-core`.
//!
//! Three families: not-found (absent rows), invalid-state (user-correctable
//! precondition failures, never auto-resolved), and `HistoryCorrupted` — an
//! invariant violation that fails loudly rather than dropping data.

use thiserror::Error;
use uuid::Uuid;

use crate::package::PackageKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("package not found: {0}")]
  PackageNotFound(Uuid),

  #[error("package {0} has no draft revision")]
  DraftNotFound(Uuid),

  #[error("package {0} is already submitted")]
  AlreadySubmitted(Uuid),

  #[error("package {0} already has an open draft")]
  AlreadyDraft(Uuid),

  #[error("linked {kind} {package_id} has not been submitted")]
  UnsubmittedCounterpart { kind: PackageKind, package_id: Uuid },

  #[error("expected a {expected} form, got a {got} form")]
  KindMismatch { expected: PackageKind, got: PackageKind },

  #[error("package is not linked to {package_id}")]
  NotLinked { package_id: Uuid },

  #[error("history of revision {revision_id} references an unsubmitted counterpart")]
  HistoryCorrupted { revision_id: Uuid },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Not-found errors are absent rows; invalid-state errors are
  /// user-correctable precondition failures.
  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::PackageNotFound(_) | Self::DraftNotFound(_))
  }

  pub fn is_invalid_state(&self) -> bool {
    matches!(
      self,
      Self::AlreadySubmitted(_)
        | Self::AlreadyDraft(_)
        | Self::UnsubmittedCounterpart { .. }
        | Self::KindMismatch { .. }
        | Self::NotLinked { .. }
    )
  }
}

/// Implemented by backend error types so callers can branch on the domain
/// taxonomy without depending on a concrete backend.
pub trait AsDomainError {
  /// The wrapped domain error, if this error carries one.
  fn as_domain(&self) -> Option<&Error>;
}

impl AsDomainError for Error {
  fn as_domain(&self) -> Option<&Error> { Some(self) }
}
