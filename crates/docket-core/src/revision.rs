//! Revision types — the fundamental unit of the Docket store.
//!
//! A revision is an immutable snapshot of a package's form data at a point
//! in time. "Editing" only ever touches the one unsubmitted draft revision;
//! once submitted, a revision is frozen and a later unlock creates a brand
//! new revision row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, package::PackageKind};

// ─── Attribution ─────────────────────────────────────────────────────────────

/// Who changed what, when, and why. Attached to every submit and unlock, and
/// threaded through every reconstructed history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
  pub updated_at:     DateTime<Utc>,
  pub updated_by:     String,
  pub updated_reason: String,
}

// ─── Form payloads ───────────────────────────────────────────────────────────

/// Contract-side submission form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractForm {
  pub name:        String,
  pub description: Option<String>,
  /// State program identifiers this contract covers.
  #[serde(default)]
  pub programs:    Vec<String>,
  pub risk_based:  Option<bool>,
}

/// Whether a rate certification is new or amends an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateType {
  New,
  Amendment,
}

/// Rate-side submission form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateForm {
  pub rate_type:          RateType,
  pub certification_date: Option<NaiveDate>,
  pub period_start:       Option<NaiveDate>,
  pub period_end:         Option<NaiveDate>,
  /// Certified amount in cents, if already determined.
  pub certified_amount:   Option<i64>,
}

/// The typed form payload of a revision. The variant name serves as the
/// `form_type` discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum FormData {
  Contract(ContractForm),
  Rate(RateForm),
}

impl FormData {
  /// The discriminant string stored in the `form_type` column.
  /// Must match the `rename_all = "lowercase"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Contract(_) => "contract",
      Self::Rate(_) => "rate",
    }
  }

  /// The package kind this form belongs to.
  pub fn kind(&self) -> PackageKind {
    match self {
      Self::Contract(_) => PackageKind::Contract,
      Self::Rate(_) => PackageKind::Rate,
    }
  }

  /// Serialise the inner payload (without the type tag) for the `form_json`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    // We want only the payload.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored in
  /// the database.
  pub fn from_parts(
    discriminant: &str,
    data: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": discriminant, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Revision ────────────────────────────────────────────────────────────────

/// A snapshot of one package's form data.
///
/// At most one revision per package has `submit_info == None` (the current
/// draft); the store enforces this with a partial unique index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
  pub revision_id: Uuid,
  pub package_id:  Uuid,
  pub created_at:  DateTime<Utc>,
  pub form:        FormData,
  /// Present iff the revision has been submitted.
  pub submit_info: Option<UpdateInfo>,
  /// Present iff this revision was created by unlocking a prior submission.
  pub unlock_info: Option<UpdateInfo>,
}

impl Revision {
  pub fn is_draft(&self) -> bool { self.submit_info.is_none() }
}
