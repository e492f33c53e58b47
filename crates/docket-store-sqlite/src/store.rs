//! [`SqliteStore`] — the SQLite implementation of [`PackageStore`].
//!
//! Contract-side and rate-side operations are one algorithm: every link
//! query is parameterised on which join column is "own side" for the
//! package kind at hand (`own_col`/`counterpart_col`), so there are no
//! duplicated contract/rate code paths to drift apart.

use std::{
  collections::{HashMap, HashSet},
  path::Path,
};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use docket_core::{
  history::{
    self, CounterpartRef, DraftLink, DraftSnapshot, DraftView, LinkEvent,
    PackageHistory,
  },
  link::Link,
  package::{Package, PackageKind, PackageStatus},
  revision::{FormData, Revision, UpdateInfo},
  store::PackageStore,
};

use crate::{
  Error, Result,
  encode::{
    RawLink, RawPackage, RawRevision, encode_dt, encode_kind, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Docket package store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// go through the one connection, so submit/unlock transactions are
/// serialised by construction.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread. Domain errors pass through the
  /// nested result; thread/connection failures surface as
  /// [`Error::Database`].
  async fn with_conn<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    let nested = self.conn.call(move |conn| Ok(f(conn))).await;
    nested.map_err(Error::Database)?
  }
}

// ─── Side selection ──────────────────────────────────────────────────────────

/// The join column holding `kind`'s own revision id.
fn own_col(kind: PackageKind) -> &'static str {
  match kind {
    PackageKind::Contract => "contract_revision_id",
    PackageKind::Rate => "rate_revision_id",
  }
}

/// The join column holding the counterpart's revision id.
fn counterpart_col(kind: PackageKind) -> &'static str {
  own_col(kind.counterpart())
}

/// A link row joined with its counterpart revision's identity and
/// attribution.
struct LinkedRevision {
  link:        Link,
  counterpart: CounterpartRef,
}

// ─── Row fetch helpers ───────────────────────────────────────────────────────

fn fetch_package(
  conn: &rusqlite::Connection,
  id: Uuid,
) -> Result<Option<Package>> {
  let raw = conn
    .query_row(
      "SELECT package_id, kind, state_number, created_at
       FROM packages WHERE package_id = ?1",
      rusqlite::params![encode_uuid(id)],
      |row| {
        Ok(RawPackage {
          package_id:   row.get(0)?,
          kind:         row.get(1)?,
          state_number: row.get(2)?,
          created_at:   row.get(3)?,
        })
      },
    )
    .optional()?;

  raw.map(RawPackage::into_package).transpose()
}

fn require_package(conn: &rusqlite::Connection, id: Uuid) -> Result<Package> {
  fetch_package(conn, id)?
    .ok_or_else(|| docket_core::Error::PackageNotFound(id).into())
}

fn next_state_number(
  conn: &rusqlite::Connection,
  kind: PackageKind,
) -> Result<u32> {
  let next: u32 = conn.query_row(
    "SELECT COALESCE(MAX(state_number), 0) + 1 FROM packages WHERE kind = ?1",
    rusqlite::params![encode_kind(kind)],
    |row| row.get(0),
  )?;
  Ok(next)
}

const REVISION_COLUMNS: &str = "revision_id, package_id, created_at, \
   form_type, form_json, submitted_at, submitted_by, submitted_reason, \
   unlocked_at, unlocked_by, unlocked_reason";

fn revision_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRevision> {
  Ok(RawRevision {
    revision_id:      row.get(0)?,
    package_id:       row.get(1)?,
    created_at:       row.get(2)?,
    form_type:        row.get(3)?,
    form_json:        row.get(4)?,
    submitted_at:     row.get(5)?,
    submitted_by:     row.get(6)?,
    submitted_reason: row.get(7)?,
    unlocked_at:      row.get(8)?,
    unlocked_by:      row.get(9)?,
    unlocked_reason:  row.get(10)?,
  })
}

/// All revisions of a package, oldest first. Rowid breaks created-at ties so
/// replay order is stable.
fn fetch_revisions(
  conn: &rusqlite::Connection,
  package_id: Uuid,
) -> Result<Vec<Revision>> {
  let sql = format!(
    "SELECT {REVISION_COLUMNS} FROM revisions
     WHERE package_id = ?1 ORDER BY created_at ASC, rowid ASC"
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(package_id)], revision_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRevision::into_revision).collect()
}

fn fetch_draft(
  conn: &rusqlite::Connection,
  package_id: Uuid,
) -> Result<Option<Revision>> {
  let sql = format!(
    "SELECT {REVISION_COLUMNS} FROM revisions
     WHERE package_id = ?1 AND submitted_at IS NULL"
  );
  let raw = conn
    .query_row(&sql, rusqlite::params![encode_uuid(package_id)], revision_from_row)
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

fn fetch_latest_revision(
  conn: &rusqlite::Connection,
  package_id: Uuid,
) -> Result<Option<Revision>> {
  let sql = format!(
    "SELECT {REVISION_COLUMNS} FROM revisions
     WHERE package_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT 1"
  );
  let raw = conn
    .query_row(&sql, rusqlite::params![encode_uuid(package_id)], revision_from_row)
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

/// The previous submitted revision of a package, excluding `current` (which
/// may have been stamped inside the running transaction).
fn fetch_previous_submitted(
  conn: &rusqlite::Connection,
  package_id: Uuid,
  current: Uuid,
) -> Result<Option<Revision>> {
  let sql = format!(
    "SELECT {REVISION_COLUMNS} FROM revisions
     WHERE package_id = ?1 AND submitted_at IS NOT NULL AND revision_id != ?2
     ORDER BY submitted_at DESC, rowid DESC LIMIT 1"
  );
  let raw = conn
    .query_row(
      &sql,
      rusqlite::params![encode_uuid(package_id), encode_uuid(current)],
      revision_from_row,
    )
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

/// All links on `own_revision_id`'s side, pending and activated alike,
/// joined with their counterpart revision's attribution.
fn fetch_links(
  conn: &rusqlite::Connection,
  kind: PackageKind,
  own_revision_id: Uuid,
) -> Result<Vec<LinkedRevision>> {
  let sql = format!(
    "SELECT l.link_id, l.contract_revision_id, l.rate_revision_id,
            l.valid_after, l.valid_until, l.is_removal,
            r.revision_id, r.package_id,
            r.submitted_at, r.submitted_by, r.submitted_reason,
            r.unlocked_at, r.unlocked_by, r.unlocked_reason
     FROM revision_links l
     JOIN revisions r ON r.revision_id = l.{cp}
     WHERE l.{own} = ?1",
    cp = counterpart_col(kind),
    own = own_col(kind),
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(own_revision_id)], |row| {
      Ok((
        RawLink {
          link_id:              row.get(0)?,
          contract_revision_id: row.get(1)?,
          rate_revision_id:     row.get(2)?,
          valid_after:          row.get(3)?,
          valid_until:          row.get(4)?,
          is_removal:           row.get(5)?,
        },
        row.get::<_, String>(6)?,
        row.get::<_, String>(7)?,
        row.get::<_, Option<String>>(8)?,
        row.get::<_, Option<String>>(9)?,
        row.get::<_, Option<String>>(10)?,
        row.get::<_, Option<String>>(11)?,
        row.get::<_, Option<String>>(12)?,
        row.get::<_, Option<String>>(13)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws
    .into_iter()
    .map(|(raw, rev_id, pkg_id, sat, sby, srs, uat, uby, urs)| {
      Ok(LinkedRevision {
        link:        raw.into_link()?,
        counterpart: CounterpartRef {
          package_id:  crate::encode::decode_uuid(&pkg_id)?,
          revision_id: crate::encode::decode_uuid(&rev_id)?,
          submit_info: crate::encode::decode_update_info(sat, sby, srs)?,
          unlock_info: crate::encode::decode_update_info(uat, uby, urs)?,
        },
      })
    })
    .collect()
}

/// All activated link events touching any of the package's own revisions,
/// grouped by owning revision — the reconstructor's input.
fn fetch_link_events(
  conn: &rusqlite::Connection,
  kind: PackageKind,
  package_id: Uuid,
) -> Result<HashMap<Uuid, Vec<LinkEvent>>> {
  let sql = format!(
    "SELECT own.revision_id,
            l.valid_after, l.valid_until, l.is_removal,
            r.revision_id, r.package_id,
            r.submitted_at, r.submitted_by, r.submitted_reason,
            r.unlocked_at, r.unlocked_by, r.unlocked_reason
     FROM revision_links l
     JOIN revisions own ON own.revision_id = l.{own}
     JOIN revisions r   ON r.revision_id   = l.{cp}
     WHERE own.package_id = ?1 AND l.valid_after IS NOT NULL",
    own = own_col(kind),
    cp = counterpart_col(kind),
  );
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![encode_uuid(package_id)], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
        row.get::<_, bool>(3)?,
        row.get::<_, String>(4)?,
        row.get::<_, String>(5)?,
        row.get::<_, Option<String>>(6)?,
        row.get::<_, Option<String>>(7)?,
        row.get::<_, Option<String>>(8)?,
        row.get::<_, Option<String>>(9)?,
        row.get::<_, Option<String>>(10)?,
        row.get::<_, Option<String>>(11)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut events: HashMap<Uuid, Vec<LinkEvent>> = HashMap::new();
  for (own, va, vu, removal, rev_id, pkg_id, sat, sby, srs, uat, uby, urs) in
    raws
  {
    let event = LinkEvent {
      counterpart: CounterpartRef {
        package_id:  crate::encode::decode_uuid(&pkg_id)?,
        revision_id: crate::encode::decode_uuid(&rev_id)?,
        submit_info: crate::encode::decode_update_info(sat, sby, srs)?,
        unlock_info: crate::encode::decode_update_info(uat, uby, urs)?,
      },
      valid_after: crate::encode::decode_dt(&va)?,
      valid_until: vu.as_deref().map(crate::encode::decode_dt).transpose()?,
      is_removal:  removal,
    };
    events
      .entry(crate::encode::decode_uuid(&own)?)
      .or_default()
      .push(event);
  }
  Ok(events)
}

// ─── Write helpers ───────────────────────────────────────────────────────────

fn insert_revision(
  conn: &rusqlite::Connection,
  revision: &Revision,
) -> Result<()> {
  let (sat, sby, srs) = match &revision.submit_info {
    Some(i) => (
      Some(encode_dt(i.updated_at)),
      Some(i.updated_by.clone()),
      Some(i.updated_reason.clone()),
    ),
    None => (None, None, None),
  };
  let (uat, uby, urs) = match &revision.unlock_info {
    Some(i) => (
      Some(encode_dt(i.updated_at)),
      Some(i.updated_by.clone()),
      Some(i.updated_reason.clone()),
    ),
    None => (None, None, None),
  };

  conn.execute(
    "INSERT INTO revisions (
       revision_id, package_id, created_at, form_type, form_json,
       submitted_at, submitted_by, submitted_reason,
       unlocked_at, unlocked_by, unlocked_reason
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    rusqlite::params![
      encode_uuid(revision.revision_id),
      encode_uuid(revision.package_id),
      encode_dt(revision.created_at),
      revision.form.discriminant(),
      revision.form.to_json().map_err(Error::Core)?.to_string(),
      sat,
      sby,
      srs,
      uat,
      uby,
      urs,
    ],
  )?;
  Ok(())
}

#[allow(clippy::too_many_arguments)]
fn insert_link_row(
  conn: &rusqlite::Connection,
  kind: PackageKind,
  own_revision_id: Uuid,
  counterpart_revision_id: Uuid,
  valid_after: Option<chrono::DateTime<Utc>>,
  valid_until: Option<chrono::DateTime<Utc>>,
  is_removal: bool,
) -> Result<()> {
  let (contract_rev, rate_rev) = match kind {
    PackageKind::Contract => (own_revision_id, counterpart_revision_id),
    PackageKind::Rate => (counterpart_revision_id, own_revision_id),
  };
  conn.execute(
    "INSERT INTO revision_links (
       link_id, contract_revision_id, rate_revision_id,
       valid_after, valid_until, is_removal
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      encode_uuid(contract_rev),
      encode_uuid(rate_rev),
      valid_after.map(encode_dt),
      valid_until.map(encode_dt),
      is_removal,
    ],
  )?;
  Ok(())
}

// ─── Read models ─────────────────────────────────────────────────────────────

fn draft_snapshot(
  conn: &rusqlite::Connection,
  kind: PackageKind,
  draft: Revision,
) -> Result<DraftSnapshot> {
  let linked = fetch_links(conn, kind, draft.revision_id)?
    .into_iter()
    .filter(|l| l.link.is_pending())
    .map(|l| DraftLink {
      package_id:  l.counterpart.package_id,
      revision_id: l.counterpart.revision_id,
    })
    .collect();
  Ok(DraftSnapshot { revision: draft, linked })
}

fn draft_view(
  conn: &rusqlite::Connection,
  package: Package,
) -> Result<DraftView> {
  let draft = fetch_draft(conn, package.package_id)?
    .ok_or(docket_core::Error::DraftNotFound(package.package_id))?;
  let draft = draft_snapshot(conn, package.kind, draft)?;
  Ok(DraftView { package, draft })
}

fn build_history(
  conn: &rusqlite::Connection,
  package: Package,
) -> Result<PackageHistory> {
  let revisions = fetch_revisions(conn, package.package_id)?;
  let events = fetch_link_events(conn, package.kind, package.package_id)?;
  let entries =
    history::reconstruct(&revisions, &events).map_err(Error::Core)?;

  let status = match revisions.last() {
    Some(latest) if latest.is_draft() => PackageStatus::Draft,
    _ => PackageStatus::Submitted,
  };
  let draft = revisions
    .iter()
    .find(|r| r.is_draft())
    .cloned()
    .map(|d| draft_snapshot(conn, package.kind, d))
    .transpose()?;

  Ok(PackageHistory { package, status, draft, entries })
}

// ─── Submit / unlock transactions ────────────────────────────────────────────

fn submit_tx(
  tx: &rusqlite::Connection,
  package: &Package,
  submitted_by: &str,
  reason: &str,
) -> Result<()> {
  let draft = fetch_draft(tx, package.package_id)?
    .ok_or(docket_core::Error::AlreadySubmitted(package.package_id))?;

  let links = fetch_links(tx, package.kind, draft.revision_id)?;
  let pending: Vec<&LinkedRevision> =
    links.iter().filter(|l| l.link.is_pending()).collect();

  // Submitting while linked to an unsubmitted counterpart is a hard error;
  // nothing below runs.
  for linked in &pending {
    if linked.counterpart.submit_info.is_none() {
      return Err(
        docket_core::Error::UnsubmittedCounterpart {
          kind:       package.kind.counterpart(),
          package_id: linked.counterpart.package_id,
        }
        .into(),
      );
    }
  }

  let now = Utc::now();

  // Freeze the draft: it becomes the new latest submitted revision.
  tx.execute(
    "UPDATE revisions
     SET submitted_at = ?1, submitted_by = ?2, submitted_reason = ?3
     WHERE revision_id = ?4",
    rusqlite::params![
      encode_dt(now),
      submitted_by,
      reason,
      encode_uuid(draft.revision_id)
    ],
  )?;

  // Activate the draft's pending links at the submit instant.
  tx.execute(
    &format!(
      "UPDATE revision_links SET valid_after = ?1
       WHERE {own} = ?2 AND valid_after IS NULL",
      own = own_col(package.kind),
    ),
    rusqlite::params![encode_dt(now), encode_uuid(draft.revision_id)],
  )?;

  // Diff against the previous submitted revision: record explicit removal
  // markers for dropped counterparts, then close out its open links.
  if let Some(previous) =
    fetch_previous_submitted(tx, package.package_id, draft.revision_id)?
  {
    let kept: HashSet<Uuid> =
      pending.iter().map(|l| l.counterpart.package_id).collect();

    for linked in fetch_links(tx, package.kind, previous.revision_id)?
      .iter()
      .filter(|l| l.link.is_open())
    {
      if !kept.contains(&linked.counterpart.package_id) {
        insert_link_row(
          tx,
          package.kind,
          draft.revision_id,
          linked.counterpart.revision_id,
          Some(now),
          Some(now),
          true,
        )?;
      }
    }

    tx.execute(
      &format!(
        "UPDATE revision_links SET valid_until = ?1
         WHERE {own} = ?2 AND valid_after IS NOT NULL AND valid_until IS NULL",
        own = own_col(package.kind),
      ),
      rusqlite::params![encode_dt(now), encode_uuid(previous.revision_id)],
    )?;
  }

  Ok(())
}

fn unlock_tx(
  tx: &rusqlite::Connection,
  package: &Package,
  unlocked_by: &str,
  reason: &str,
) -> Result<Revision> {
  let latest = fetch_latest_revision(tx, package.package_id)?
    .ok_or_else(|| Error::Decode("package has no revisions".into()))?;
  if latest.is_draft() {
    return Err(docket_core::Error::AlreadyDraft(package.package_id).into());
  }

  let now = Utc::now();
  let revision = Revision {
    revision_id: Uuid::new_v4(),
    package_id:  package.package_id,
    created_at:  now,
    form:        latest.form.clone(),
    submit_info: None,
    unlock_info: Some(UpdateInfo {
      updated_at:     now,
      updated_by:     unlocked_by.to_owned(),
      updated_reason: reason.to_owned(),
    }),
  };
  insert_revision(tx, &revision)?;

  // The new draft inherits every link valid at this instant as pending.
  for linked in fetch_links(tx, package.kind, latest.revision_id)?
    .iter()
    .filter(|l| l.link.is_open())
  {
    insert_link_row(
      tx,
      package.kind,
      revision.revision_id,
      linked.counterpart.revision_id,
      None,
      None,
      false,
    )?;
  }

  Ok(revision)
}

// ─── PackageStore impl ───────────────────────────────────────────────────────

impl PackageStore for SqliteStore {
  type Error = Error;

  async fn create_package(
    &self,
    kind: PackageKind,
    form: FormData,
  ) -> Result<DraftView> {
    if form.kind() != kind {
      return Err(
        docket_core::Error::KindMismatch { expected: kind, got: form.kind() }
          .into(),
      );
    }

    self
      .with_conn(move |conn| {
        let tx = conn.transaction().map_err(Error::Sqlite)?;

        let now = Utc::now();
        let package = Package {
          package_id: Uuid::new_v4(),
          kind,
          state_number: next_state_number(&tx, kind)?,
          created_at: now,
        };
        tx.execute(
          "INSERT INTO packages (package_id, kind, state_number, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            encode_uuid(package.package_id),
            encode_kind(kind),
            package.state_number,
            encode_dt(now),
          ],
        )?;

        let revision = Revision {
          revision_id: Uuid::new_v4(),
          package_id: package.package_id,
          created_at: now,
          form,
          submit_info: None,
          unlock_info: None,
        };
        insert_revision(&tx, &revision)?;

        tx.commit().map_err(Error::Sqlite)?;
        Ok(DraftView {
          package,
          draft: DraftSnapshot { revision, linked: Vec::new() },
        })
      })
      .await
  }

  async fn get_package(&self, id: Uuid) -> Result<Option<Package>> {
    self.with_conn(move |conn| fetch_package(conn, id)).await
  }

  async fn list_packages(
    &self,
    kind: Option<PackageKind>,
  ) -> Result<Vec<Package>> {
    self
      .with_conn(move |conn| {
        let kind_str = kind.map(encode_kind);
        let raws: Vec<RawPackage> = if let Some(k) = kind_str {
          let mut stmt = conn.prepare(
            "SELECT package_id, kind, state_number, created_at
             FROM packages WHERE kind = ?1 ORDER BY state_number ASC",
          )?;
          stmt
            .query_map(rusqlite::params![k], |row| {
              Ok(RawPackage {
                package_id:   row.get(0)?,
                kind:         row.get(1)?,
                state_number: row.get(2)?,
                created_at:   row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let mut stmt = conn.prepare(
            "SELECT package_id, kind, state_number, created_at
             FROM packages ORDER BY created_at ASC, rowid ASC",
          )?;
          stmt
            .query_map([], |row| {
              Ok(RawPackage {
                package_id:   row.get(0)?,
                kind:         row.get(1)?,
                state_number: row.get(2)?,
                created_at:   row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws.into_iter().map(RawPackage::into_package).collect()
      })
      .await
  }

  async fn update_draft(&self, id: Uuid, form: FormData) -> Result<DraftView> {
    self
      .with_conn(move |conn| {
        let package = require_package(conn, id)?;
        if form.kind() != package.kind {
          return Err(
            docket_core::Error::KindMismatch {
              expected: package.kind,
              got:      form.kind(),
            }
            .into(),
          );
        }
        let draft = fetch_draft(conn, id)?
          .ok_or(docket_core::Error::DraftNotFound(id))?;

        // Draft edits overwrite in place; no new rows.
        conn.execute(
          "UPDATE revisions SET form_type = ?1, form_json = ?2
           WHERE revision_id = ?3",
          rusqlite::params![
            form.discriminant(),
            form.to_json().map_err(Error::Core)?.to_string(),
            encode_uuid(draft.revision_id),
          ],
        )?;

        draft_view(conn, package)
      })
      .await
  }

  async fn link_draft(&self, id: Uuid, counterpart_id: Uuid) -> Result<DraftView> {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction().map_err(Error::Sqlite)?;

        let package = require_package(&tx, id)?;
        let counterpart = require_package(&tx, counterpart_id)?;
        if counterpart.kind != package.kind.counterpart() {
          return Err(
            docket_core::Error::KindMismatch {
              expected: package.kind.counterpart(),
              got:      counterpart.kind,
            }
            .into(),
          );
        }

        let draft = fetch_draft(&tx, id)?
          .ok_or(docket_core::Error::DraftNotFound(id))?;
        let counterpart_latest = fetch_latest_revision(&tx, counterpart_id)?
          .ok_or_else(|| Error::Decode("package has no revisions".into()))?;

        let existing = fetch_links(&tx, package.kind, draft.revision_id)?
          .into_iter()
          .find(|l| {
            l.link.is_pending() && l.counterpart.package_id == counterpart_id
          });

        match existing {
          // Re-point the pending row at the counterpart's latest revision.
          Some(linked) => {
            tx.execute(
              &format!(
                "UPDATE revision_links SET {cp} = ?1 WHERE link_id = ?2",
                cp = counterpart_col(package.kind),
              ),
              rusqlite::params![
                encode_uuid(counterpart_latest.revision_id),
                encode_uuid(linked.link.link_id),
              ],
            )?;
          }
          None => insert_link_row(
            &tx,
            package.kind,
            draft.revision_id,
            counterpart_latest.revision_id,
            None,
            None,
            false,
          )?,
        }

        let view = draft_view(&tx, package)?;
        tx.commit().map_err(Error::Sqlite)?;
        Ok(view)
      })
      .await
  }

  async fn unlink_draft(
    &self,
    id: Uuid,
    counterpart_id: Uuid,
  ) -> Result<DraftView> {
    self
      .with_conn(move |conn| {
        let package = require_package(conn, id)?;
        let draft = fetch_draft(conn, id)?
          .ok_or(docket_core::Error::DraftNotFound(id))?;

        let pending = fetch_links(conn, package.kind, draft.revision_id)?
          .into_iter()
          .find(|l| {
            l.link.is_pending() && l.counterpart.package_id == counterpart_id
          })
          .ok_or(docket_core::Error::NotLinked {
            package_id: counterpart_id,
          })?;

        // Pending rows are draft workspace, not history; deletion is fine.
        conn.execute(
          "DELETE FROM revision_links WHERE link_id = ?1",
          rusqlite::params![encode_uuid(pending.link.link_id)],
        )?;

        draft_view(conn, package)
      })
      .await
  }

  async fn submit(
    &self,
    id: Uuid,
    submitted_by: String,
    reason: String,
  ) -> Result<PackageHistory> {
    self
      .with_conn(move |conn| {
        let package = require_package(conn, id)?;

        let tx = conn.transaction().map_err(Error::Sqlite)?;
        submit_tx(&tx, &package, &submitted_by, &reason)?;
        tx.commit().map_err(Error::Sqlite)?;

        build_history(conn, package)
      })
      .await
  }

  async fn unlock(
    &self,
    id: Uuid,
    unlocked_by: String,
    reason: String,
  ) -> Result<DraftView> {
    self
      .with_conn(move |conn| {
        let package = require_package(conn, id)?;

        let tx = conn.transaction().map_err(Error::Sqlite)?;
        unlock_tx(&tx, &package, &unlocked_by, &reason)?;
        tx.commit().map_err(Error::Sqlite)?;

        draft_view(conn, package)
      })
      .await
  }

  async fn find_with_history(&self, id: Uuid) -> Result<PackageHistory> {
    self
      .with_conn(move |conn| {
        let package = require_package(conn, id)?;
        build_history(conn, package)
      })
      .await
  }
}
