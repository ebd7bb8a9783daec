//! Open events: append-only log of tracking-pixel fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default minimum delay between send and a countable open. Mail clients
/// that prefetch images on delivery land inside this window.
pub const DEFAULT_MIN_OPEN_DELAY_SECS: i64 = 60;

/// A recorded pixel fetch. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenEvent {
  pub event_id:   i64,
  pub sender:     String,
  pub receiver:   String,
  /// Per-send tracking token carried in the pixel URL.
  pub send_key:   String,
  pub sent_epoch: i64,
  pub opened_at:  DateTime<Utc>,
  pub client_ip:  Option<String>,
  pub user_agent: Option<String>,
}

/// Input to [`crate::store::TrackingStore::record_open`].
#[derive(Debug, Clone)]
pub struct NewOpenEvent {
  pub sender:     String,
  pub receiver:   String,
  pub send_key:   String,
  pub sent_epoch: i64,
  pub opened_at:  DateTime<Utc>,
  pub client_ip:  Option<String>,
  pub user_agent: Option<String>,
}

/// Decide whether a pixel fetch counts as an open.
///
/// Requires a non-empty token, a positive send epoch, and at least
/// `min_delay_secs` elapsed between `sent_epoch` and `now_epoch`.
pub fn open_is_admissible(
  send_key: &str,
  sent_epoch: i64,
  now_epoch: i64,
  min_delay_secs: i64,
) -> bool {
  if send_key.trim().is_empty() || sent_epoch <= 0 {
    return false;
  }
  now_epoch >= sent_epoch.saturating_add(min_delay_secs)
}

#[cfg(test)]
mod tests {
  use super::*;

  const NOW: i64 = 1_700_000_000;

  #[test]
  fn open_after_delay_is_admissible() {
    assert!(open_is_admissible("k", NOW - 60, NOW, 60));
    assert!(open_is_admissible("k", NOW - 3_600, NOW, 60));
  }

  #[test]
  fn prefetch_inside_delay_is_rejected() {
    assert!(!open_is_admissible("k", NOW - 59, NOW, 60));
    assert!(!open_is_admissible("k", NOW, NOW, 60));
    // Send time in the future (clock skew).
    assert!(!open_is_admissible("k", NOW + 10, NOW, 60));
  }

  #[test]
  fn missing_token_or_epoch_is_rejected() {
    assert!(!open_is_admissible("", NOW - 3_600, NOW, 60));
    assert!(!open_is_admissible("  ", NOW - 3_600, NOW, 60));
    assert!(!open_is_admissible("k", 0, NOW, 60));
    assert!(!open_is_admissible("k", -5, NOW, 60));
  }

  #[test]
  fn huge_epoch_does_not_overflow() {
    assert!(!open_is_admissible("k", i64::MAX, NOW, 60));
  }
}
