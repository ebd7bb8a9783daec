//! Subscription preferences: one row per (sender, receiver) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::normalize_email;

/// A normalised (sender, receiver) pair. Construct via [`ContactPair::new`]
/// so both addresses are always trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactPair {
  pub sender:   String,
  pub receiver: String,
}

impl ContactPair {
  pub fn new(sender: &str, receiver: &str) -> Self {
    Self {
      sender:   normalize_email(sender),
      receiver: normalize_email(receiver),
    }
  }

  /// `true` when either address is empty after normalisation.
  pub fn is_incomplete(&self) -> bool {
    self.sender.is_empty() || self.receiver.is_empty()
  }
}

/// Whether `receiver` currently accepts sends from `sender`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPreference {
  pub sender:        String,
  pub receiver:      String,
  pub is_subscribed: bool,
  pub updated_at:    DateTime<Utc>,
}

impl SubscriptionPreference {
  pub fn pair(&self) -> ContactPair {
    ContactPair::new(&self.sender, &self.receiver)
  }

  pub fn is_opted_out(&self) -> bool { !self.is_subscribed }
}
