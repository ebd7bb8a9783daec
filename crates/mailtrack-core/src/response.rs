//! Response classification.
//!
//! The free-text `Responds` column is mapped onto a small taxonomy. The
//! phrases that drive the mapping come from configuration so wording changes
//! do not need a code change.

use std::str::FromStr as _;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{Error, Result};

/// Status message stamped on a record whose pair is opted out.
pub const OPTED_OUT_STATUS_MESSAGE: &str = "Receiver has unsubscribed";

/// Status message stamped on the log row updated by an unsubscribe link.
pub const LINK_UNSUBSCRIBE_STATUS_MESSAGE: &str = "Receiver unsubscribed via link";

// ─── ResponseKind ────────────────────────────────────────────────────────────

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
pub enum ResponseKind {
  NoResponse,
  Responded,
  PositiveResponse,
  Unsubscribed,
}

impl ResponseKind {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s.trim())
      .map_err(|_| Error::UnknownResponseKind(s.to_owned()))
  }

  /// The discriminant stored in the `response_kind` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NoResponse => "no_response",
      Self::Responded => "responded",
      Self::PositiveResponse => "positive_response",
      Self::Unsubscribed => "unsubscribed",
    }
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

/// Phrase-driven classifier for response text.
///
/// Matching is case-insensitive. `no_response_markers` must match the whole
/// trimmed value; the phrase lists match whole words anywhere in it, so
/// "uninterested" does not count as "interested". Opt-out phrases are
/// checked before positive phrases, so "not interested" wins over
/// "interested".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseClassifier {
  pub no_response_markers: Vec<String>,
  pub opt_out_phrases:     Vec<String>,
  pub positive_phrases:    Vec<String>,
  /// Value written into `response` when an opted-out pair is imported or an
  /// unsubscribe link is confirmed.
  pub unsubscribed_marker: String,
}

impl Default for ResponseClassifier {
  fn default() -> Self {
    Self {
      no_response_markers: strings(&["no response yet", "no response", "none", "-"]),
      opt_out_phrases:     strings(&[
        "unsubscribe",
        "unsubscribed",
        "not interested",
        "uninterested",
        "remove me",
        "opt out",
        "opt-out",
        "do not contact",
        "don't contact",
      ]),
      positive_phrases:    strings(&[
        "positive",
        "interested",
        "schedule",
        "book a call",
        "let's talk",
        "sounds good",
      ]),
      unsubscribed_marker: "Unsubscribed".to_owned(),
    }
  }
}

impl ResponseClassifier {
  pub fn classify(&self, response: Option<&str>) -> ResponseKind {
    let text = response.map(str::trim).unwrap_or_default().to_lowercase();

    if text.is_empty()
      || self
        .no_response_markers
        .iter()
        .any(|m| m.trim().to_lowercase() == text)
    {
      return ResponseKind::NoResponse;
    }

    if contains_any(&text, &self.opt_out_phrases)
      || text == self.unsubscribed_marker.trim().to_lowercase()
    {
      return ResponseKind::Unsubscribed;
    }

    if contains_any(&text, &self.positive_phrases) {
      return ResponseKind::PositiveResponse;
    }

    ResponseKind::Responded
  }

  pub fn is_opt_out(&self, response: Option<&str>) -> bool {
    self.classify(response) == ResponseKind::Unsubscribed
  }
}

/// `true` when some phrase occurs in `text` as whole words.
fn contains_any(text: &str, phrases: &[String]) -> bool {
  phrases.iter().any(|p| {
    let p = p.trim().to_lowercase();
    !p.is_empty() && contains_words(text, &p)
  })
}

fn contains_words(text: &str, phrase: &str) -> bool {
  text.match_indices(phrase).any(|(start, m)| {
    let before = text[..start].chars().next_back();
    let after = text[start + m.len()..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
  })
}

fn strings(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| (*s).to_owned()).collect()
}
