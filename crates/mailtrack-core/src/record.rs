//! Send-log records: one row per logical send event.
//!
//! A record is created the first time its identity key is imported and is
//! afterwards only field-updated by later imports or unsubscribe side-effects.
//! Records are never deleted.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
  Error, Result, identity::IdentityKey, response::ResponseKind,
  subscription::ContactPair,
};

// ─── Campaign type ───────────────────────────────────────────────────────────

/// Which outbound campaign a send belongs to. Closed set; part of the
/// identity key.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CampaignType {
  Outreach,
  FollowUp,
  Reminder,
}

impl CampaignType {
  /// Parse a selector as sent by a client (`"follow_up"`, `" Outreach "`).
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s.trim())
      .map_err(|_| Error::UnknownCampaignType(s.to_owned()))
  }

  /// The discriminant stored in the `campaign_type` column and hashed into
  /// the identity key.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Outreach => "outreach",
      Self::FollowUp => "follow_up",
      Self::Reminder => "reminder",
    }
  }
}

// ─── Mutable fields ──────────────────────────────────────────────────────────

/// The fields an import may rewrite on an existing record. Equality over this
/// struct is the "did anything change" test used by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
  pub first_name:     Option<String>,
  pub company:        Option<String>,
  pub status:         Option<String>,
  pub status_message: Option<String>,
  pub response:       Option<String>,
  pub subject:        Option<String>,
  pub body:           Option<String>,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted send-log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogRecord {
  pub record_id:     i64,
  pub identity_key:  IdentityKey,
  pub sender:        String,
  pub receiver:      String,
  pub campaign_type: CampaignType,
  /// Naive wall-clock time as written in the import file, second precision.
  pub sent_at:       NaiveDateTime,
  #[serde(flatten)]
  pub fields:        RecordFields,
  /// Classification of `fields.response`, computed at write time.
  pub response_kind: ResponseKind,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

impl SendLogRecord {
  pub fn pair(&self) -> ContactPair {
    ContactPair::new(&self.sender, &self.receiver)
  }
}

/// Input to the insert half of an import. `created_at`/`updated_at` are set
/// by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSendLog {
  pub identity_key:  IdentityKey,
  pub sender:        String,
  pub receiver:      String,
  pub campaign_type: CampaignType,
  pub sent_at:       NaiveDateTime,
  pub fields:        RecordFields,
  pub response_kind: ResponseKind,
}

/// Input to the update half of an import: rewrite every mutable field of an
/// existing record and refresh `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
  pub record_id:     i64,
  pub identity_key:  IdentityKey,
  pub fields:        RecordFields,
  pub response_kind: ResponseKind,
}
