//! Import reconciliation: candidate rows → minimal store operations.
//!
//! Reconciliation runs in two pure steps around two store lookups:
//!
//! 1. [`prepare`] normalises every row, derives its identity key and sets
//!    aside rows that cannot be keyed.
//! 2. The caller fetches the subscription state for [`Prepared::pairs`] and
//!    the existing records for [`Prepared::keys`].
//! 3. [`plan`] applies the opt-out rules and diffs each row against its
//!    stored counterpart, producing an [`ImportPlan`].
//!
//! The plan is then committed by
//! [`crate::store::TrackingStore::apply_import`] in a single transaction.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  identity::{IdentityKey, normalize_email, normalize_text, parse_sent_at},
  record::{CampaignType, NewSendLog, RecordFields, RecordUpdate, SendLogRecord},
  response::{OPTED_OUT_STATUS_MESSAGE, ResponseClassifier, ResponseKind},
  subscription::{ContactPair, SubscriptionPreference},
};

// ─── Input ───────────────────────────────────────────────────────────────────

/// One data row of an import file, exactly as read. Every cell is raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
  pub sender:         String,
  pub receiver:       String,
  pub first_name:     String,
  pub company:        String,
  pub status:         String,
  pub status_message: String,
  pub sent_at:        String,
  pub response:       String,
  pub subject:        String,
  pub body:           String,
}

/// Why a row was not keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  MissingSender,
  MissingReceiver,
  MissingSentAt,
  UnparseableSentAt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
  /// 1-based index among the file's data rows.
  pub row:    usize,
  pub reason: SkipReason,
}

/// A row that passed identity validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
  pub row:    usize,
  pub key:    IdentityKey,
  pub pair:   ContactPair,
  pub send:   NewSendLog,
}

/// Output of [`prepare`].
#[derive(Debug, Clone)]
pub struct Prepared {
  pub campaign_type: CampaignType,
  pub total_rows:    usize,
  pub rows:          Vec<NormalizedRow>,
  pub skipped:       Vec<SkippedRow>,
}

impl Prepared {
  /// Distinct identity keys, in a stable order.
  pub fn keys(&self) -> Vec<IdentityKey> {
    self
      .rows
      .iter()
      .map(|r| r.key.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  /// Distinct (sender, receiver) pairs, in a stable order.
  pub fn pairs(&self) -> Vec<ContactPair> {
    self
      .rows
      .iter()
      .map(|r| r.pair.clone())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Counters reported back to the importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
  pub import_id:              Uuid,
  pub campaign_type:          Option<CampaignType>,
  pub total_rows_in_file:     usize,
  pub inserted:               usize,
  pub updated:                usize,
  /// Rows whose key matched a stored record with no field differences.
  pub duplicates:             usize,
  /// Rows folded into an earlier row of the same file with the same key.
  pub collapsed_in_file:      usize,
  pub skipped:                usize,
  /// Rows whose response was forced to the unsubscribed marker.
  pub unsubscribed_overrides: usize,
  /// Pairs newly opted out because a row's response was an opt-out.
  pub opt_outs_detected:      usize,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub skipped_rows:           Vec<SkippedRow>,
}

/// The writes an import will perform. Inserts are committed before updates.
#[derive(Debug, Clone, Default)]
pub struct ImportPlan {
  pub inserts:  Vec<NewSendLog>,
  pub updates:  Vec<RecordUpdate>,
  /// Pairs to upsert as opted out, committed with the rest of the batch.
  pub opt_outs: Vec<ContactPair>,
  pub summary:  ImportSummary,
}

impl ImportPlan {
  pub fn is_noop(&self) -> bool {
    self.inserts.is_empty() && self.updates.is_empty() && self.opt_outs.is_empty()
  }
}

// ─── Step 1: prepare ─────────────────────────────────────────────────────────

/// Normalise `rows` for `campaign_type`, keying every row that has a sender,
/// a receiver and a parseable sent-at.
pub fn prepare(rows: Vec<CandidateRow>, campaign_type: CampaignType) -> Prepared {
  let total_rows = rows.len();
  let mut normalized = Vec::with_capacity(total_rows);
  let mut skipped = Vec::new();

  for (idx, row) in rows.into_iter().enumerate() {
    match normalize_row(idx + 1, row, campaign_type) {
      Ok(n) => normalized.push(n),
      Err(reason) => skipped.push(SkippedRow { row: idx + 1, reason }),
    }
  }

  Prepared {
    campaign_type,
    total_rows,
    rows: normalized,
    skipped,
  }
}

fn normalize_row(
  row_no: usize,
  row: CandidateRow,
  campaign_type: CampaignType,
) -> Result<NormalizedRow, SkipReason> {
  let sender = normalize_email(&row.sender);
  if sender.is_empty() {
    return Err(SkipReason::MissingSender);
  }
  let receiver = normalize_email(&row.receiver);
  if receiver.is_empty() {
    return Err(SkipReason::MissingReceiver);
  }
  if row.sent_at.trim().is_empty() {
    return Err(SkipReason::MissingSentAt);
  }
  let sent_at = parse_sent_at(&row.sent_at).ok_or(SkipReason::UnparseableSentAt)?;

  let key  = IdentityKey::derive(&sender, &receiver, campaign_type, sent_at);
  let pair = ContactPair::new(&sender, &receiver);

  let fields = RecordFields {
    first_name:     normalize_text(&row.first_name),
    company:        normalize_text(&row.company),
    status:         normalize_text(&row.status),
    status_message: normalize_text(&row.status_message),
    response:       normalize_text(&row.response),
    subject:        normalize_text(&row.subject),
    body:           normalize_text(&row.body),
  };

  Ok(NormalizedRow {
    row: row_no,
    key: key.clone(),
    pair,
    send: NewSendLog {
      identity_key: key,
      sender,
      receiver,
      campaign_type,
      sent_at,
      fields,
      // Filled in by `plan` once opt-out overrides are applied.
      response_kind: ResponseKind::NoResponse,
    },
  })
}

// ─── Step 3: plan ────────────────────────────────────────────────────────────

/// Where a key already sits in the plan being built.
enum Queued {
  Insert(usize),
  Update(usize),
}

/// Diff `prepared` against the stored state and produce the write plan.
///
/// - `subscriptions`: stored preferences for (at least) `prepared.pairs()`.
/// - `existing`: stored records for (at least) `prepared.keys()`.
pub fn plan(
  prepared: Prepared,
  classifier: &ResponseClassifier,
  subscriptions: &HashMap<ContactPair, SubscriptionPreference>,
  existing: &HashMap<IdentityKey, SendLogRecord>,
) -> ImportPlan {
  let mut summary = ImportSummary {
    import_id: Uuid::new_v4(),
    campaign_type: Some(prepared.campaign_type),
    total_rows_in_file: prepared.total_rows,
    skipped: prepared.skipped.len(),
    skipped_rows: prepared.skipped,
    ..ImportSummary::default()
  };

  let mut opted_out: HashSet<ContactPair> = subscriptions
    .values()
    .filter(|p| p.is_opted_out())
    .map(SubscriptionPreference::pair)
    .collect();

  let mut inserts: Vec<NewSendLog> = vec![];
  let mut updates: Vec<RecordUpdate> = vec![];
  let mut opt_outs: Vec<ContactPair> = vec![];
  let mut queued: HashMap<IdentityKey, Queued> = HashMap::new();

  for row in prepared.rows {
    let NormalizedRow { key, pair, mut send, .. } = row;

    // Subscription rules. An opted-out pair always carries the marker, so a
    // re-import of the same file stays a no-op.
    if opted_out.contains(&pair) {
      send.fields.response = Some(classifier.unsubscribed_marker.clone());
      send.fields.status_message = Some(OPTED_OUT_STATUS_MESSAGE.to_owned());
      summary.unsubscribed_overrides += 1;
    } else if classifier.is_opt_out(send.fields.response.as_deref()) {
      opted_out.insert(pair.clone());
      opt_outs.push(pair);
      send.fields.response = Some(classifier.unsubscribed_marker.clone());
      send.fields.status_message = Some(OPTED_OUT_STATUS_MESSAGE.to_owned());
      summary.opt_outs_detected += 1;
    }
    send.response_kind = classifier.classify(send.fields.response.as_deref());

    // Same key earlier in this file: the later row wins.
    if let Some(q) = queued.get(&key) {
      let (fields, kind) = match *q {
        Queued::Insert(i) => {
          let queued_insert = &mut inserts[i];
          (&mut queued_insert.fields, &mut queued_insert.response_kind)
        }
        Queued::Update(i) => {
          let queued_update = &mut updates[i];
          (&mut queued_update.fields, &mut queued_update.response_kind)
        }
      };
      if *fields == send.fields {
        summary.duplicates += 1;
      } else {
        *fields = send.fields;
        *kind = send.response_kind;
        summary.collapsed_in_file += 1;
      }
      continue;
    }

    match existing.get(&key) {
      None => {
        queued.insert(key, Queued::Insert(inserts.len()));
        inserts.push(send);
      }
      Some(record) if record.fields == send.fields => {
        summary.duplicates += 1;
      }
      Some(record) => {
        queued.insert(key.clone(), Queued::Update(updates.len()));
        updates.push(RecordUpdate {
          record_id:     record.record_id,
          identity_key:  key,
          fields:        send.fields,
          response_kind: send.response_kind,
        });
      }
    }
  }

  // Folding same-key rows can land an update back on the stored values.
  let queued_updates = updates.len();
  updates.retain(|u| {
    existing
      .get(&u.identity_key)
      .is_none_or(|record| record.fields != u.fields)
  });
  summary.duplicates += queued_updates - updates.len();

  summary.inserted = inserts.len();
  summary.updated = updates.len();

  ImportPlan {
    inserts,
    updates,
    opt_outs,
    summary,
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
