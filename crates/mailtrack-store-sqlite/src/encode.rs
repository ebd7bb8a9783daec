//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Record timestamps are stored as RFC 3339 UTC strings with microsecond
//! precision so they sort lexically. `sent_at` is stored naive, at second
//! precision, in the same format that feeds the identity key.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use mailtrack_core::{
  identity::{IdentityKey, SENT_AT_FORMAT},
  open_event::OpenEvent,
  record::{CampaignType, RecordFields, SendLogRecord},
  response::ResponseKind,
  subscription::SubscriptionPreference,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── sent_at ─────────────────────────────────────────────────────────────────

pub fn decode_sent_at(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, SENT_AT_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// Column list matching [`RawSendLog::from_row`].
pub const SEND_LOG_COLUMNS: &str = "record_id, identity_key, sender, receiver, campaign_type, \
   sent_at, first_name, company, status, status_message, response, subject, body, \
   response_kind, created_at, updated_at";

/// A `send_logs` row as read from SQLite, before decoding.
pub struct RawSendLog {
  pub record_id:      i64,
  pub identity_key:   String,
  pub sender:         String,
  pub receiver:       String,
  pub campaign_type:  String,
  pub sent_at:        String,
  pub first_name:     Option<String>,
  pub company:        Option<String>,
  pub status:         Option<String>,
  pub status_message: Option<String>,
  pub response:       Option<String>,
  pub subject:        Option<String>,
  pub body:           Option<String>,
  pub response_kind:  String,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawSendLog {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:      row.get(0)?,
      identity_key:   row.get(1)?,
      sender:         row.get(2)?,
      receiver:       row.get(3)?,
      campaign_type:  row.get(4)?,
      sent_at:        row.get(5)?,
      first_name:     row.get(6)?,
      company:        row.get(7)?,
      status:         row.get(8)?,
      status_message: row.get(9)?,
      response:       row.get(10)?,
      subject:        row.get(11)?,
      body:           row.get(12)?,
      response_kind:  row.get(13)?,
      created_at:     row.get(14)?,
      updated_at:     row.get(15)?,
    })
  }

  pub fn into_record(self) -> Result<SendLogRecord> {
    Ok(SendLogRecord {
      record_id:     self.record_id,
      identity_key:  IdentityKey::from_stored(self.identity_key),
      sender:        self.sender,
      receiver:      self.receiver,
      campaign_type: CampaignType::parse(&self.campaign_type)?,
      sent_at:       decode_sent_at(&self.sent_at)?,
      fields:        RecordFields {
        first_name:     self.first_name,
        company:        self.company,
        status:         self.status,
        status_message: self.status_message,
        response:       self.response,
        subject:        self.subject,
        body:           self.body,
      },
      response_kind: ResponseKind::parse(&self.response_kind)?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const PREFERENCE_COLUMNS: &str = "sender, receiver, is_subscribed, updated_at";

pub struct RawPreference {
  pub sender:        String,
  pub receiver:      String,
  pub is_subscribed: i64,
  pub updated_at:    String,
}

impl RawPreference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sender:        row.get(0)?,
      receiver:      row.get(1)?,
      is_subscribed: row.get(2)?,
      updated_at:    row.get(3)?,
    })
  }

  pub fn into_preference(self) -> Result<SubscriptionPreference> {
    Ok(SubscriptionPreference {
      sender:        self.sender,
      receiver:      self.receiver,
      is_subscribed: self.is_subscribed != 0,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const OPEN_EVENT_COLUMNS: &str =
  "event_id, sender, receiver, send_key, sent_epoch, opened_at, client_ip, user_agent";

pub struct RawOpenEvent {
  pub event_id:   i64,
  pub sender:     String,
  pub receiver:   String,
  pub send_key:   String,
  pub sent_epoch: i64,
  pub opened_at:  String,
  pub client_ip:  Option<String>,
  pub user_agent: Option<String>,
}

impl RawOpenEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:   row.get(0)?,
      sender:     row.get(1)?,
      receiver:   row.get(2)?,
      send_key:   row.get(3)?,
      sent_epoch: row.get(4)?,
      opened_at:  row.get(5)?,
      client_ip:  row.get(6)?,
      user_agent: row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<OpenEvent> {
    Ok(OpenEvent {
      event_id:   self.event_id,
      sender:     self.sender,
      receiver:   self.receiver,
      send_key:   self.send_key,
      sent_epoch: self.sent_epoch,
      opened_at:  decode_dt(&self.opened_at)?,
      client_ip:  self.client_ip,
      user_agent: self.user_agent,
    })
  }
}
