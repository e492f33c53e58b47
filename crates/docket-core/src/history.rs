//! History reconstruction — the replay of a package's revision and link
//! rows into an ordered list of logical revisions.
//!
//! A logical revision is one coherent state the package passed through: its
//! own form data plus the complete set of counterpart revisions valid at
//! that point. Entries are caused either by the package's own submit or by
//! a counterpart's submit changing the link set afterwards. The list is
//! computed at query time from the append-only link log — never stored.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  package::{Package, PackageStatus},
  revision::{FormData, Revision, UpdateInfo},
};

// ─── Link events ─────────────────────────────────────────────────────────────

/// A counterpart revision as seen from one side of a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterpartRef {
  pub package_id:  Uuid,
  pub revision_id: Uuid,
  /// `None` only for an unsubmitted counterpart — which must never reach
  /// the reconstructor; see [`Error::HistoryCorrupted`].
  pub submit_info: Option<UpdateInfo>,
  pub unlock_info: Option<UpdateInfo>,
}

/// One activated link row, resolved against its counterpart revision.
/// Input to [`reconstruct`]; pending links never appear here.
#[derive(Debug, Clone)]
pub struct LinkEvent {
  pub counterpart: CounterpartRef,
  pub valid_after: DateTime<Utc>,
  pub valid_until: Option<DateTime<Utc>>,
  pub is_removal:  bool,
}

// ─── Logical revisions ───────────────────────────────────────────────────────

/// What caused a logical revision to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ChangeCause {
  /// The package's own submit.
  Own,
  /// A linked counterpart's submit changed the link set.
  Counterpart { package_id: Uuid },
}

/// One reconstructed history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalRevision {
  pub revision_id:  Uuid,
  /// Position within the owning revision's entry run; 0 is the entry for
  /// the revision's own submit.
  pub sequence:     u32,
  pub created_at:   DateTime<Utc>,
  pub form:         FormData,
  pub submit_info:  UpdateInfo,
  pub unlock_info:  Option<UpdateInfo>,
  /// Attribution for this particular entry: the owning revision's submit
  /// info for sequence 0, the counterpart's submit info otherwise.
  pub change_info:  UpdateInfo,
  pub caused_by:    ChangeCause,
  pub counterparts: Vec<CounterpartRef>,
}

impl LogicalRevision {
  /// Stable external identity. The composite keeps counterpart-driven
  /// entries from colliding with the owning revision's id downstream.
  pub fn entry_id(&self) -> String {
    format!("{}-{}", self.revision_id, self.sequence)
  }
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A pending association on a draft revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLink {
  pub package_id:  Uuid,
  pub revision_id: Uuid,
}

/// The current draft revision plus its working link set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSnapshot {
  pub revision: Revision,
  pub linked:   Vec<DraftLink>,
}

/// The editable view of a package, returned by draft mutations and unlock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftView {
  pub package: Package,
  pub draft:   DraftSnapshot,
}

/// The full audit trail of a package. `entries` is most-recent-first; the
/// unsubmitted draft (if any) is reported separately, never as an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageHistory {
  pub package: Package,
  pub status:  PackageStatus,
  pub draft:   Option<DraftSnapshot>,
  pub entries: Vec<LogicalRevision>,
}

// ─── Reconstruction ──────────────────────────────────────────────────────────

/// Replay a package's submitted revisions against its activated link events.
///
/// `revisions` must be ascending by `created_at`; `events` maps each
/// revision id to the activated links on that revision's own side. Entries
/// are built chronologically and reversed for delivery.
///
/// Events with `valid_after` at or before the owning revision's submit
/// instant seed the initial entry (the links the submit itself activated);
/// strictly later events are counterpart-driven and each set change emits
/// its own entry.
pub fn reconstruct(
  revisions: &[Revision],
  events: &HashMap<Uuid, Vec<LinkEvent>>,
) -> Result<Vec<LogicalRevision>> {
  let mut entries = Vec::new();

  for revision in revisions {
    // The draft is reported separately, not as history.
    let Some(submit) = &revision.submit_info else {
      continue;
    };

    let mut revision_events: Vec<&LinkEvent> = events
      .get(&revision.revision_id)
      .map(|v| v.iter().collect())
      .unwrap_or_default();
    revision_events.sort_by(|a, b| {
      a.valid_after
        .cmp(&b.valid_after)
        .then(a.counterpart.package_id.cmp(&b.counterpart.package_id))
    });

    for event in &revision_events {
      if event.counterpart.submit_info.is_none() {
        return Err(Error::HistoryCorrupted {
          revision_id: revision.revision_id,
        });
      }
    }

    // BTreeMap keyed by counterpart package id: one live link per
    // counterpart identity, deterministic iteration order.
    let mut working: BTreeMap<Uuid, CounterpartRef> = BTreeMap::new();

    let mut iter = revision_events.into_iter().peekable();
    while let Some(event) = iter.peek() {
      if event.valid_after > submit.updated_at {
        break;
      }
      let event = iter.next().unwrap_or_else(|| unreachable!());
      if event.is_removal {
        working.remove(&event.counterpart.package_id);
      } else {
        working.insert(event.counterpart.package_id, event.counterpart.clone());
      }
    }

    let mut sequence = 0u32;
    entries.push(make_entry(
      revision,
      submit,
      sequence,
      submit.clone(),
      ChangeCause::Own,
      &working,
    ));

    for event in iter {
      let changed = if event.is_removal {
        working.remove(&event.counterpart.package_id).is_some()
      } else {
        let previous = working
          .insert(event.counterpart.package_id, event.counterpart.clone());
        previous.is_none_or(|p| p.revision_id != event.counterpart.revision_id)
      };

      if changed {
        sequence += 1;
        let change_info = event.counterpart.submit_info.clone().ok_or(
          Error::HistoryCorrupted {
            revision_id: revision.revision_id,
          },
        )?;
        entries.push(make_entry(
          revision,
          submit,
          sequence,
          change_info,
          ChangeCause::Counterpart {
            package_id: event.counterpart.package_id,
          },
          &working,
        ));
      }
    }
  }

  entries.reverse();
  Ok(entries)
}

fn make_entry(
  revision: &Revision,
  submit: &UpdateInfo,
  sequence: u32,
  change_info: UpdateInfo,
  caused_by: ChangeCause,
  working: &BTreeMap<Uuid, CounterpartRef>,
) -> LogicalRevision {
  LogicalRevision {
    revision_id: revision.revision_id,
    sequence,
    created_at: revision.created_at,
    form: revision.form.clone(),
    submit_info: submit.clone(),
    unlock_info: revision.unlock_info.clone(),
    change_info,
    caused_by,
    counterparts: working.values().cloned().collect(),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::revision::{ContractForm, RateForm, RateType};

  fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap()
  }

  fn info(minute: u32, by: &str, reason: &str) -> UpdateInfo {
    UpdateInfo {
      updated_at:     at(minute),
      updated_by:     by.into(),
      updated_reason: reason.into(),
    }
  }

  fn contract_form(name: &str) -> FormData {
    FormData::Contract(ContractForm {
      name:        name.into(),
      description: None,
      programs:    vec!["pmap".into()],
      risk_based:  Some(true),
    })
  }

  fn rate_form() -> FormData {
    FormData::Rate(RateForm {
      rate_type:          RateType::New,
      certification_date: None,
      period_start:       None,
      period_end:         None,
      certified_amount:   Some(125_000),
    })
  }

  fn submitted_revision(
    package_id: Uuid,
    created_minute: u32,
    submit_minute: u32,
  ) -> Revision {
    Revision {
      revision_id: Uuid::new_v4(),
      package_id,
      created_at:  at(created_minute),
      form:        contract_form("c1"),
      submit_info: Some(info(submit_minute, "alice", "initial")),
      unlock_info: None,
    }
  }

  fn counterpart(
    package_id: Uuid,
    revision_id: Uuid,
    submit_minute: u32,
  ) -> CounterpartRef {
    CounterpartRef {
      package_id,
      revision_id,
      submit_info: Some(info(submit_minute, "bob", "rate cert")),
      unlock_info: None,
    }
  }

  fn add_event(c: CounterpartRef, minute: u32) -> LinkEvent {
    LinkEvent {
      counterpart: c,
      valid_after: at(minute),
      valid_until: None,
      is_removal:  false,
    }
  }

  fn removal_event(c: CounterpartRef, minute: u32) -> LinkEvent {
    LinkEvent {
      counterpart: c,
      valid_after: at(minute),
      valid_until: Some(at(minute)),
      is_removal:  true,
    }
  }

  #[test]
  fn draft_revision_is_skipped() {
    let package_id = Uuid::new_v4();
    let draft = Revision {
      revision_id: Uuid::new_v4(),
      package_id,
      created_at:  at(0),
      form:        rate_form(),
      submit_info: None,
      unlock_info: None,
    };

    let entries = reconstruct(&[draft], &HashMap::new()).unwrap();
    assert!(entries.is_empty());
  }

  #[test]
  fn single_submit_seeds_one_entry() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);
    let rate_id = Uuid::new_v4();
    let rate_rev = Uuid::new_v4();

    let mut events = HashMap::new();
    // Activated at exactly the submit instant: part of the seed.
    events.insert(
      revision.revision_id,
      vec![add_event(counterpart(rate_id, rate_rev, 4), 5)],
    );

    let entries = reconstruct(std::slice::from_ref(&revision), &events).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sequence, 0);
    assert_eq!(entries[0].caused_by, ChangeCause::Own);
    assert_eq!(entries[0].counterparts.len(), 1);
    assert_eq!(entries[0].counterparts[0].revision_id, rate_rev);
    assert_eq!(entries[0].change_info, entries[0].submit_info);
  }

  #[test]
  fn counterpart_resubmit_emits_replacement_entry() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);
    let rate_id = Uuid::new_v4();
    let rate_rev_1 = Uuid::new_v4();
    let rate_rev_2 = Uuid::new_v4();

    let mut events = HashMap::new();
    events.insert(revision.revision_id, vec![
      add_event(counterpart(rate_id, rate_rev_1, 5), 5),
      add_event(counterpart(rate_id, rate_rev_2, 10), 10),
    ]);

    let entries = reconstruct(std::slice::from_ref(&revision), &events).unwrap();
    assert_eq!(entries.len(), 2);

    // Most recent first: the counterpart-driven replacement.
    assert_eq!(entries[0].sequence, 1);
    assert_eq!(
      entries[0].caused_by,
      ChangeCause::Counterpart { package_id: rate_id }
    );
    assert_eq!(entries[0].counterparts[0].revision_id, rate_rev_2);
    assert_eq!(entries[0].change_info.updated_at, at(10));

    assert_eq!(entries[1].sequence, 0);
    assert_eq!(entries[1].counterparts[0].revision_id, rate_rev_1);
  }

  #[test]
  fn removal_drops_counterpart_from_working_set() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);
    let rate_b = Uuid::new_v4();
    let rate_c = Uuid::new_v4();
    let rev_b = Uuid::new_v4();
    let rev_c = Uuid::new_v4();
    // The remover's new revision carries the attribution.
    let remover_rev = Uuid::new_v4();

    let mut events = HashMap::new();
    events.insert(revision.revision_id, vec![
      add_event(counterpart(rate_b, rev_b, 5), 5),
      add_event(counterpart(rate_c, rev_c, 5), 5),
      removal_event(counterpart(rate_b, remover_rev, 12), 12),
    ]);

    let entries = reconstruct(std::slice::from_ref(&revision), &events).unwrap();
    assert_eq!(entries.len(), 2);

    let latest = &entries[0];
    assert_eq!(latest.counterparts.len(), 1);
    assert_eq!(latest.counterparts[0].package_id, rate_c);
    assert_eq!(
      latest.caused_by,
      ChangeCause::Counterpart { package_id: rate_b }
    );

    let initial = &entries[1];
    assert_eq!(initial.counterparts.len(), 2);
  }

  #[test]
  fn removal_of_unknown_counterpart_emits_nothing() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);

    let mut events = HashMap::new();
    events.insert(revision.revision_id, vec![removal_event(
      counterpart(Uuid::new_v4(), Uuid::new_v4(), 9),
      9,
    )]);

    let entries = reconstruct(std::slice::from_ref(&revision), &events).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].counterparts.is_empty());
  }

  #[test]
  fn entries_are_reverse_chronological_across_revisions() {
    let package_id = Uuid::new_v4();
    let first = submitted_revision(package_id, 0, 5);
    let mut second = submitted_revision(package_id, 10, 15);
    second.unlock_info = Some(info(10, "alice", "fix"));
    let rate_id = Uuid::new_v4();

    let mut events = HashMap::new();
    events.insert(first.revision_id, vec![
      add_event(counterpart(rate_id, Uuid::new_v4(), 5), 5),
      add_event(counterpart(rate_id, Uuid::new_v4(), 8), 8),
    ]);
    events.insert(second.revision_id, vec![add_event(
      counterpart(rate_id, Uuid::new_v4(), 15),
      15,
    )]);

    let entries = reconstruct(&[first.clone(), second.clone()], &events).unwrap();
    assert_eq!(entries.len(), 3);

    let stamps: Vec<_> =
      entries.iter().map(|e| e.change_info.updated_at).collect();
    assert!(stamps.windows(2).all(|w| w[0] > w[1]), "stamps: {stamps:?}");

    assert_eq!(entries[0].revision_id, second.revision_id);
    assert_eq!(entries[0].unlock_info.as_ref().unwrap().updated_reason, "fix");
    assert_eq!(entries[2].revision_id, first.revision_id);
  }

  #[test]
  fn unsubmitted_counterpart_fails_loudly() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);

    let mut leaked = counterpart(Uuid::new_v4(), Uuid::new_v4(), 5);
    leaked.submit_info = None;

    let mut events = HashMap::new();
    events.insert(revision.revision_id, vec![add_event(leaked, 5)]);

    let err = reconstruct(std::slice::from_ref(&revision), &events).unwrap_err();
    assert!(matches!(err, Error::HistoryCorrupted { revision_id } if revision_id == revision.revision_id));
  }

  #[test]
  fn entry_ids_are_unique_composites() {
    let package_id = Uuid::new_v4();
    let revision = submitted_revision(package_id, 0, 5);
    let rate_id = Uuid::new_v4();

    let mut events = HashMap::new();
    events.insert(revision.revision_id, vec![
      add_event(counterpart(rate_id, Uuid::new_v4(), 5), 5),
      add_event(counterpart(rate_id, Uuid::new_v4(), 9), 9),
    ]);

    let entries = reconstruct(std::slice::from_ref(&revision), &events).unwrap();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].entry_id(), entries[1].entry_id());
    assert_eq!(entries[1].entry_id(), format!("{}-0", revision.revision_id));
  }
}
