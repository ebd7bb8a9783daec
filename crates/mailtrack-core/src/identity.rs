//! Identity keys and the field normalisation they depend on.
//!
//! An identity key is a SHA-256 digest over the normalised
//! (sender, receiver, campaign type, sent-at) tuple. Two rows with the same
//! key are the same logical send event regardless of any other field.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::record::CampaignType;

/// Second-precision format used for hashing and for the `sent_at` column.
pub const SENT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats accepted for the `SentAt` column, tried in order.
const SENT_AT_INPUT_FORMATS: &[&str] = &[
  "%m/%d/%Y %H:%M:%S",
  "%m/%d/%Y %H:%M",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S%.f",
];

const SENT_AT_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d"];

// ─── IdentityKey ─────────────────────────────────────────────────────────────

/// A 64-character lowercase hex digest identifying one logical send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
  /// Derive the key for a send. Address fields are normalised here, so
  /// callers may pass raw cell values.
  pub fn derive(
    sender: &str,
    receiver: &str,
    campaign: CampaignType,
    sent_at: NaiveDateTime,
  ) -> Self {
    let sender   = normalize_email(sender);
    let receiver = normalize_email(receiver);
    let sent_at  = format_sent_at(sent_at);

    let mut hasher = Sha256::new();
    for part in [sender.as_str(), receiver.as_str(), campaign.as_str(), sent_at.as_str()] {
      hasher.update(part.as_bytes());
      // Field separator; a NUL cannot appear in any normalised field.
      hasher.update([0u8]);
    }
    Self(hex::encode(hasher.finalize()))
  }

  /// Wrap a key read back from storage.
  pub fn from_stored(s: impl Into<String>) -> Self { Self(s.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Trim and lowercase an address.
pub fn normalize_email(s: &str) -> String { s.trim().to_lowercase() }

/// Trim a free-text cell; empty cells become `None`.
pub fn normalize_text(s: &str) -> Option<String> {
  let t = s.trim();
  if t.is_empty() { None } else { Some(t.to_owned()) }
}

/// Render a sent-at timestamp at second precision.
pub fn format_sent_at(dt: NaiveDateTime) -> String {
  dt.trunc_subsecs(0).format(SENT_AT_FORMAT).to_string()
}

/// Parse a `SentAt` cell. Returns `None` for empty or unrecognised values.
///
/// RFC 3339 values carrying an offset are converted to UTC; everything else
/// is taken as naive wall-clock time. Sub-second precision is dropped.
pub fn parse_sent_at(s: &str) -> Option<NaiveDateTime> {
  let s = s.trim();
  if s.is_empty() {
    return None;
  }

  for fmt in SENT_AT_INPUT_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(dt.trunc_subsecs(0));
    }
  }

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.naive_utc().trunc_subsecs(0));
  }

  SENT_AT_DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    .and_then(|d| d.and_hms_opt(0, 0, 0))
}
