//! Link — an interval-stamped fact connecting a contract revision to a rate
//! revision.
//!
//! A draft's associations start as *pending* links (`valid_after == None`).
//! Submitting the owning side activates them by stamping `valid_after`; from
//! that point the row is an append-only fact whose only permitted mutation is
//! closing it out (`valid_until`), and only by the submit engine of either
//! side. History is reconstructed by scanning links, never by mutating them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::package::PackageKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
  pub link_id:              Uuid,
  pub contract_revision_id: Uuid,
  pub rate_revision_id:     Uuid,
  /// `None` while pending; the submit instant once activated.
  pub valid_after:          Option<DateTime<Utc>>,
  /// `None` while current; stamped when a later submit supersedes the link.
  pub valid_until:          Option<DateTime<Utc>>,
  /// Sentinel: a link with `valid_after == valid_until` and this flag set
  /// records an explicit disconnection at that instant. No connection ever
  /// held over the degenerate interval.
  pub is_removal:           bool,
}

impl Link {
  /// A draft's working association, not yet part of history.
  pub fn is_pending(&self) -> bool { self.valid_after.is_none() }

  /// Activated, still current, and not a removal marker.
  pub fn is_open(&self) -> bool {
    self.valid_after.is_some() && self.valid_until.is_none() && !self.is_removal
  }

  /// The revision on `kind`'s side of this link.
  pub fn revision_on(&self, kind: PackageKind) -> Uuid {
    match kind {
      PackageKind::Contract => self.contract_revision_id,
      PackageKind::Rate => self.rate_revision_id,
    }
  }

  /// The revision on the side opposite `kind`.
  pub fn counterpart_revision_on(&self, kind: PackageKind) -> Uuid {
    self.revision_on(kind.counterpart())
  }
}
