//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Form payloads are stored
//! as compact JSON next to their type discriminant. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use docket_core::{
  link::Link,
  package::{Package, PackageKind},
  revision::{FormData, Revision, UpdateInfo},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── PackageKind ─────────────────────────────────────────────────────────────

pub fn encode_kind(k: PackageKind) -> &'static str {
  match k {
    PackageKind::Contract => "contract",
    PackageKind::Rate => "rate",
  }
}

pub fn decode_kind(s: &str) -> Result<PackageKind> {
  match s {
    "contract" => Ok(PackageKind::Contract),
    "rate" => Ok(PackageKind::Rate),
    other => Err(Error::Decode(format!("unknown package kind: {other:?}"))),
  }
}

// ─── UpdateInfo ──────────────────────────────────────────────────────────────

/// Assemble an attribution triple from its three nullable columns.
/// All-null means absent; a partially-null triple is a corrupt row.
pub fn decode_update_info(
  at: Option<String>,
  by: Option<String>,
  reason: Option<String>,
) -> Result<Option<UpdateInfo>> {
  match (at, by, reason) {
    (None, None, None) => Ok(None),
    (Some(at), Some(by), Some(reason)) => Ok(Some(UpdateInfo {
      updated_at:     decode_dt(&at)?,
      updated_by:     by,
      updated_reason: reason,
    })),
    _ => Err(Error::Decode("partially-null update attribution".into())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `packages` row.
pub struct RawPackage {
  pub package_id:   String,
  pub kind:         String,
  pub state_number: u32,
  pub created_at:   String,
}

impl RawPackage {
  pub fn into_package(self) -> Result<Package> {
    Ok(Package {
      package_id:   decode_uuid(&self.package_id)?,
      kind:         decode_kind(&self.kind)?,
      state_number: self.state_number,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `revisions` row.
pub struct RawRevision {
  pub revision_id:      String,
  pub package_id:       String,
  pub created_at:       String,
  pub form_type:        String,
  pub form_json:        String,
  pub submitted_at:     Option<String>,
  pub submitted_by:     Option<String>,
  pub submitted_reason: Option<String>,
  pub unlocked_at:      Option<String>,
  pub unlocked_by:      Option<String>,
  pub unlocked_reason:  Option<String>,
}

impl RawRevision {
  pub fn into_revision(self) -> Result<Revision> {
    let form_json: serde_json::Value = serde_json::from_str(&self.form_json)?;
    let form = FormData::from_parts(&self.form_type, form_json)
      .map_err(Error::Core)?;

    Ok(Revision {
      revision_id: decode_uuid(&self.revision_id)?,
      package_id: decode_uuid(&self.package_id)?,
      created_at: decode_dt(&self.created_at)?,
      form,
      submit_info: decode_update_info(
        self.submitted_at,
        self.submitted_by,
        self.submitted_reason,
      )?,
      unlock_info: decode_update_info(
        self.unlocked_at,
        self.unlocked_by,
        self.unlocked_reason,
      )?,
    })
  }
}

/// Raw strings read directly from a `revision_links` row.
pub struct RawLink {
  pub link_id:              String,
  pub contract_revision_id: String,
  pub rate_revision_id:     String,
  pub valid_after:          Option<String>,
  pub valid_until:          Option<String>,
  pub is_removal:           bool,
}

impl RawLink {
  pub fn into_link(self) -> Result<Link> {
    Ok(Link {
      link_id:              decode_uuid(&self.link_id)?,
      contract_revision_id: decode_uuid(&self.contract_revision_id)?,
      rate_revision_id:     decode_uuid(&self.rate_revision_id)?,
      valid_after:          self
        .valid_after
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      valid_until:          self
        .valid_until
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      is_removal:           self.is_removal,
    })
  }
}
