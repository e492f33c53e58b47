//! Package — the thin envelope that aggregates revisions.
//!
//! A package holds only identity metadata. Everything that changes over time
//! lives in its revisions; its status is derived from them on read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of submission package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
  Contract,
  Rate,
}

impl PackageKind {
  /// The kind a package of this kind links to. Contract↔Rate linkage is
  /// bidirectional; both sides run the same submit/unlock algorithm.
  pub fn counterpart(self) -> Self {
    match self {
      Self::Contract => Self::Rate,
      Self::Rate => Self::Contract,
    }
  }
}

impl std::fmt::Display for PackageKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Contract => write!(f, "contract"),
      Self::Rate => write!(f, "rate"),
    }
  }
}

/// Derived from a package's revisions: `Draft` if the most recent revision
/// is unsubmitted, `Submitted` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
  Draft,
  Submitted,
}

/// A long-lived versioned identity. `state_number` is the state-assigned
/// sequence number, monotonically increasing per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
  pub package_id:   Uuid,
  pub kind:         PackageKind,
  pub state_number: u32,
  pub created_at:   DateTime<Utc>,
}
