//! Integration tests for `SqliteStore` against an in-memory database.

use docket_core::{
  Error as CoreError,
  history::ChangeCause,
  package::{PackageKind, PackageStatus},
  revision::{ContractForm, FormData, RateForm, RateType},
  store::PackageStore,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn contract_form(name: &str) -> FormData {
  FormData::Contract(ContractForm {
    name:        name.into(),
    description: Some("managed care base contract".into()),
    programs:    vec!["pmap".into(), "snbc".into()],
    risk_based:  Some(true),
  })
}

fn rate_form() -> FormData {
  FormData::Rate(RateForm {
    rate_type:          RateType::New,
    certification_date: None,
    period_start:       None,
    period_end:         None,
    certified_amount:   Some(250_000),
  })
}

/// Create a rate package and submit it immediately.
async fn submitted_rate(s: &SqliteStore) -> Uuid {
  let draft = s
    .create_package(PackageKind::Rate, rate_form())
    .await
    .unwrap();
  let id = draft.package.package_id;
  s.submit(id, "actuary".into(), "rate cert".into())
    .await
    .unwrap();
  id
}

// ─── Packages and drafts ─────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_package() {
  let s = store().await;

  let view = s
    .create_package(PackageKind::Contract, contract_form("c1"))
    .await
    .unwrap();
  assert_eq!(view.package.kind, PackageKind::Contract);
  assert_eq!(view.package.state_number, 1);
  assert!(view.draft.revision.is_draft());
  assert!(view.draft.linked.is_empty());

  let fetched = s.get_package(view.package.package_id).await.unwrap();
  assert_eq!(fetched.unwrap().package_id, view.package.package_id);
}

#[tokio::test]
async fn get_package_missing_returns_none() {
  let s = store().await;
  assert!(s.get_package(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn state_numbers_increment_per_kind() {
  let s = store().await;

  let c1 = s
    .create_package(PackageKind::Contract, contract_form("a"))
    .await
    .unwrap();
  let c2 = s
    .create_package(PackageKind::Contract, contract_form("b"))
    .await
    .unwrap();
  let r1 = s
    .create_package(PackageKind::Rate, rate_form())
    .await
    .unwrap();

  assert_eq!(c1.package.state_number, 1);
  assert_eq!(c2.package.state_number, 2);
  assert_eq!(r1.package.state_number, 1);

  let contracts = s
    .list_packages(Some(PackageKind::Contract))
    .await
    .unwrap();
  assert_eq!(contracts.len(), 2);
  assert!(contracts.iter().all(|p| p.kind == PackageKind::Contract));
}

#[tokio::test]
async fn create_package_rejects_mismatched_form() {
  let s = store().await;
  let err = s
    .create_package(PackageKind::Contract, rate_form())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::KindMismatch { .. })));
}

#[tokio::test]
async fn update_draft_overwrites_in_place() {
  let s = store().await;
  let view = s
    .create_package(PackageKind::Contract, contract_form("before"))
    .await
    .unwrap();
  let id = view.package.package_id;

  let updated = s.update_draft(id, contract_form("after")).await.unwrap();
  match &updated.draft.revision.form {
    FormData::Contract(f) => assert_eq!(f.name, "after"),
    other => panic!("unexpected form: {other:?}"),
  }

  // Still exactly one revision, still a draft, no history entries.
  let history = s.find_with_history(id).await.unwrap();
  assert_eq!(history.status, PackageStatus::Draft);
  assert!(history.entries.is_empty());
  assert!(history.draft.is_some());
}

#[tokio::test]
async fn update_draft_after_submit_errors() {
  let s = store().await;
  let view = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let id = view.package.package_id;
  s.submit(id, "alice".into(), "init".into()).await.unwrap();

  let err = s.update_draft(id, contract_form("late")).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::DraftNotFound(_))));
}

// ─── Linking ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn link_draft_records_pending_association() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let rate_id = submitted_rate(&s).await;

  let view = s
    .link_draft(contract.package.package_id, rate_id)
    .await
    .unwrap();
  assert_eq!(view.draft.linked.len(), 1);
  assert_eq!(view.draft.linked[0].package_id, rate_id);
}

#[tokio::test]
async fn link_draft_rejects_same_kind() {
  let s = store().await;
  let a = s
    .create_package(PackageKind::Contract, contract_form("a"))
    .await
    .unwrap();
  let b = s
    .create_package(PackageKind::Contract, contract_form("b"))
    .await
    .unwrap();

  let err = s
    .link_draft(a.package.package_id, b.package.package_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::KindMismatch { .. })));
}

#[tokio::test]
async fn unlink_without_link_errors() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let rate_id = submitted_rate(&s).await;

  let err = s
    .unlink_draft(contract.package.package_id, rate_id)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::NotLinked { .. })));
}

#[tokio::test]
async fn relinking_repoints_at_latest_counterpart_revision() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  let rate_id = submitted_rate(&s).await;

  let first = s.link_draft(contract_id, rate_id).await.unwrap();
  let first_rev = first.draft.linked[0].revision_id;

  // The rate gains a new revision; re-linking follows it.
  s.unlock(rate_id, "actuary".into(), "correction".into())
    .await
    .unwrap();
  s.submit(rate_id, "actuary".into(), "v2".into())
    .await
    .unwrap();

  let second = s.link_draft(contract_id, rate_id).await.unwrap();
  assert_eq!(second.draft.linked.len(), 1);
  assert_ne!(second.draft.linked[0].revision_id, first_rev);
}

// ─── Submit ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_produces_single_history_entry() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  let rate_id = submitted_rate(&s).await;
  s.link_draft(contract_id, rate_id).await.unwrap();

  let history = s
    .submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap();

  assert_eq!(history.status, PackageStatus::Submitted);
  assert!(history.draft.is_none());
  assert_eq!(history.entries.len(), 1);

  let entry = &history.entries[0];
  assert_eq!(entry.caused_by, ChangeCause::Own);
  assert_eq!(entry.sequence, 0);
  assert_eq!(entry.submit_info.updated_by, "alice");
  assert_eq!(entry.submit_info.updated_reason, "init");
  assert_eq!(entry.counterparts.len(), 1);
  assert_eq!(entry.counterparts[0].package_id, rate_id);
}

#[tokio::test]
async fn submit_requires_submitted_counterparts() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;

  // A rate that is still a draft.
  let rate = s
    .create_package(PackageKind::Rate, rate_form())
    .await
    .unwrap();
  s.link_draft(contract_id, rate.package.package_id)
    .await
    .unwrap();

  let err = s
    .submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::UnsubmittedCounterpart { package_id, .. })
      if package_id == rate.package.package_id
  ));

  // Nothing committed: the contract is still an unsubmitted draft.
  let history = s.find_with_history(contract_id).await.unwrap();
  assert_eq!(history.status, PackageStatus::Draft);
  assert!(history.entries.is_empty());
}

#[tokio::test]
async fn submit_twice_errors() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let id = contract.package.package_id;
  s.submit(id, "alice".into(), "init".into()).await.unwrap();

  let err = s
    .submit(id, "alice".into(), "again".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AlreadySubmitted(_))));
}

#[tokio::test]
async fn submit_missing_package_errors() {
  let s = store().await;
  let err = s
    .submit(Uuid::new_v4(), "alice".into(), "init".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::PackageNotFound(_))));
}

// ─── Unlock ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unlock_round_trip_restores_link_set() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  let rate_id = submitted_rate(&s).await;
  s.link_draft(contract_id, rate_id).await.unwrap();
  let submitted = s
    .submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap();
  let linked_at_submit: Vec<_> = submitted.entries[0]
    .counterparts
    .iter()
    .map(|c| (c.package_id, c.revision_id))
    .collect();

  let view = s
    .unlock(contract_id, "bob".into(), "fix typo".into())
    .await
    .unwrap();

  assert!(view.draft.revision.is_draft());
  let unlock = view.draft.revision.unlock_info.as_ref().unwrap();
  assert_eq!(unlock.updated_by, "bob");
  assert_eq!(unlock.updated_reason, "fix typo");

  let inherited: Vec<_> = view
    .draft
    .linked
    .iter()
    .map(|l| (l.package_id, l.revision_id))
    .collect();
  assert_eq!(inherited, linked_at_submit);
}

#[tokio::test]
async fn unlock_copies_form_data() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("original"))
    .await
    .unwrap();
  let id = contract.package.package_id;
  s.submit(id, "alice".into(), "init".into()).await.unwrap();

  let view = s.unlock(id, "bob".into(), "edit".into()).await.unwrap();
  match &view.draft.revision.form {
    FormData::Contract(f) => assert_eq!(f.name, "original"),
    other => panic!("unexpected form: {other:?}"),
  }
}

#[tokio::test]
async fn unlock_draft_errors() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();

  let err = s
    .unlock(contract.package.package_id, "bob".into(), "oops".into())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AlreadyDraft(_))));
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_missing_package_errors() {
  let s = store().await;
  let err = s.find_with_history(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::PackageNotFound(_))));
}

#[tokio::test]
async fn history_grows_with_each_cycle() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let id = contract.package.package_id;

  let h1 = s.submit(id, "alice".into(), "init".into()).await.unwrap();
  assert_eq!(h1.entries.len(), 1);

  s.unlock(id, "alice".into(), "round 2".into()).await.unwrap();
  let h2 = s.submit(id, "alice".into(), "v2".into()).await.unwrap();
  assert_eq!(h2.entries.len(), 2);

  s.unlock(id, "alice".into(), "round 3".into()).await.unwrap();
  let h3 = s.submit(id, "alice".into(), "v3".into()).await.unwrap();
  assert_eq!(h3.entries.len(), 3);

  // Most recent first, strictly decreasing change stamps.
  let stamps: Vec<_> = h3
    .entries
    .iter()
    .map(|e| e.change_info.updated_at)
    .collect();
  assert!(stamps.windows(2).all(|w| w[0] > w[1]), "stamps: {stamps:?}");
}

#[tokio::test]
async fn counterpart_resubmission_appears_in_history() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  let rate_id = submitted_rate(&s).await;
  s.link_draft(contract_id, rate_id).await.unwrap();
  s.submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap();

  // The rate is revised independently; the contract never moves.
  s.unlock(rate_id, "actuary".into(), "recalc".into())
    .await
    .unwrap();
  s.submit(rate_id, "actuary".into(), "v2".into())
    .await
    .unwrap();

  let history = s.find_with_history(contract_id).await.unwrap();
  assert_eq!(history.entries.len(), 2);

  let latest = &history.entries[0];
  assert_eq!(
    latest.caused_by,
    ChangeCause::Counterpart { package_id: rate_id }
  );
  assert_eq!(latest.change_info.updated_reason, "v2");
  assert_eq!(latest.sequence, 1);

  let initial = &history.entries[1];
  assert_eq!(initial.caused_by, ChangeCause::Own);
  assert_ne!(
    latest.counterparts[0].revision_id,
    initial.counterparts[0].revision_id,
  );
  // Both entries belong to the same owning revision; composite ids differ.
  assert_eq!(latest.revision_id, initial.revision_id);
  assert_ne!(latest.entry_id(), initial.entry_id());
}

#[tokio::test]
async fn removal_tracking_across_resubmission() {
  let s = store().await;
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  let rate_b = submitted_rate(&s).await;
  let rate_c = submitted_rate(&s).await;
  s.link_draft(contract_id, rate_b).await.unwrap();
  s.link_draft(contract_id, rate_c).await.unwrap();
  s.submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap();

  s.unlock(contract_id, "alice".into(), "drop b".into())
    .await
    .unwrap();
  s.unlink_draft(contract_id, rate_b).await.unwrap();
  let history = s
    .submit(contract_id, "alice".into(), "without b".into())
    .await
    .unwrap();

  assert_eq!(history.entries.len(), 2);
  let latest_ids: Vec<_> = history.entries[0]
    .counterparts
    .iter()
    .map(|c| c.package_id)
    .collect();
  assert_eq!(latest_ids, vec![rate_c]);
  let initial_ids: Vec<_> = history.entries[1]
    .counterparts
    .iter()
    .map(|c| c.package_id)
    .collect();
  assert_eq!(initial_ids.len(), 2);
  assert!(initial_ids.contains(&rate_b) && initial_ids.contains(&rate_c));

  // The dropped rate sees the disconnection as a counterpart-driven entry.
  let rate_history = s.find_with_history(rate_b).await.unwrap();
  assert_eq!(rate_history.entries.len(), 3);

  let removal = &rate_history.entries[0];
  assert!(removal.counterparts.is_empty());
  assert_eq!(
    removal.caused_by,
    ChangeCause::Counterpart { package_id: contract_id }
  );
  assert_eq!(removal.change_info.updated_reason, "without b");

  let linked = &rate_history.entries[1];
  assert_eq!(linked.counterparts.len(), 1);
  assert_eq!(linked.counterparts[0].package_id, contract_id);

  let seed = &rate_history.entries[2];
  assert_eq!(seed.caused_by, ChangeCause::Own);
  assert!(seed.counterparts.is_empty());
}

#[tokio::test]
async fn rate_side_submit_is_symmetric() {
  let s = store().await;

  // Contract first, already submitted.
  let contract = s
    .create_package(PackageKind::Contract, contract_form("c"))
    .await
    .unwrap();
  let contract_id = contract.package.package_id;
  s.submit(contract_id, "alice".into(), "init".into())
    .await
    .unwrap();

  // Rate links to it and submits from its own side.
  let rate = s
    .create_package(PackageKind::Rate, rate_form())
    .await
    .unwrap();
  let rate_id = rate.package.package_id;
  s.link_draft(rate_id, contract_id).await.unwrap();
  let history = s
    .submit(rate_id, "actuary".into(), "cert".into())
    .await
    .unwrap();

  assert_eq!(history.entries.len(), 1);
  assert_eq!(history.entries[0].counterparts.len(), 1);
  assert_eq!(history.entries[0].counterparts[0].package_id, contract_id);

  // And the contract's history gained a counterpart-driven entry.
  let contract_history = s.find_with_history(contract_id).await.unwrap();
  assert_eq!(contract_history.entries.len(), 2);
  assert_eq!(
    contract_history.entries[0].caused_by,
    ChangeCause::Counterpart { package_id: rate_id }
  );
}
