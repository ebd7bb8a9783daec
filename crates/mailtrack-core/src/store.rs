//! The `TrackingStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `mailtrack-store-sqlite`). Higher layers (`mailtrack-api`,
//! `mailtrack-server`) depend on this abstraction, not on any concrete
//! backend.

use std::{collections::HashMap, future::Future};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  identity::IdentityKey,
  open_event::{NewOpenEvent, OpenEvent},
  reconcile::{ImportPlan, ImportSummary},
  record::{CampaignType, SendLogRecord},
  response::ResponseKind,
  subscription::{ContactPair, SubscriptionPreference},
};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 500;

// ─── Pagination ──────────────────────────────────────────────────────────────

/// 1-based page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub page:     u32,
  pub per_page: u32,
}

impl Default for Pagination {
  fn default() -> Self {
    Self {
      page:     1,
      per_page: DEFAULT_PER_PAGE,
    }
  }
}

impl Pagination {
  /// Build from optional query parameters. `per_page` above
  /// [`MAX_PER_PAGE`] is clamped; zero for either value is rejected.
  pub fn new(page: Option<u32>, per_page: Option<u32>) -> Result<Self> {
    let page = page.unwrap_or(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
    if page == 0 {
      return Err(Error::InvalidFilter("page must be at least 1".into()));
    }
    if per_page == 0 {
      return Err(Error::InvalidFilter("per_page must be at least 1".into()));
    }
    Ok(Self {
      page,
      per_page: per_page.min(MAX_PER_PAGE),
    })
  }

  pub fn limit(&self) -> u64 { u64::from(self.per_page) }

  pub fn offset(&self) -> u64 {
    u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
  }
}

/// One page of results plus the totals needed to render a pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:         Vec<T>,
  pub page:          u32,
  pub per_page:      u32,
  pub total_records: u64,
  pub total_pages:   u64,
}

impl<T> Page<T> {
  pub fn new(items: Vec<T>, pagination: Pagination, total_records: u64) -> Self {
    let per_page = u64::from(pagination.per_page.max(1));
    Self {
      items,
      page: pagination.page,
      per_page: pagination.per_page,
      total_records,
      total_pages: total_records.div_ceil(per_page),
    }
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items:         self.items.into_iter().map(f).collect(),
      page:          self.page,
      per_page:      self.per_page,
      total_records: self.total_records,
      total_pages:   self.total_pages,
    }
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// Filters for [`TrackingStore::list_send_logs`] and
/// [`TrackingStore::summarize_send_logs`]. Dates apply to the calendar day of
/// `sent_at`. Address filters are exact matches on the normalised address.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
  pub date:          Option<NaiveDate>,
  pub date_from:     Option<NaiveDate>,
  pub date_to:       Option<NaiveDate>,
  pub sender:        Option<String>,
  pub receiver:      Option<String>,
  pub response_kind: Option<ResponseKind>,
  pub campaign_type: Option<CampaignType>,
  pub pagination:    Pagination,
}

impl LogQuery {
  /// Reject contradictory date filters.
  pub fn validate(&self) -> Result<()> {
    if self.date.is_some() && (self.date_from.is_some() || self.date_to.is_some()) {
      return Err(Error::InvalidFilter(
        "`date` cannot be combined with `date_from`/`date_to`".into(),
      ));
    }
    match (self.date_from, self.date_to) {
      (Some(from), Some(to)) if from > to => Err(Error::InvalidFilter(format!(
        "date_from {from} is after date_to {to}"
      ))),
      _ => Ok(()),
    }
  }
}

/// Filters for [`TrackingStore::list_open_events`].
#[derive(Debug, Clone, Default)]
pub struct OpenQuery {
  pub sender:     Option<String>,
  pub receiver:   Option<String>,
  pub send_key:   Option<String>,
  pub pagination: Pagination,
}

/// Filters for [`TrackingStore::list_subscriptions`].
#[derive(Debug, Clone, Default)]
pub struct SubscriptionQuery {
  pub sender:        Option<String>,
  pub receiver:      Option<String>,
  pub is_subscribed: Option<bool>,
  pub pagination:    Pagination,
}

/// Aggregate counts over every record matching a [`LogQuery`], ignoring its
/// pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
  pub total:             u64,
  pub no_response:       u64,
  pub responded:         u64,
  pub positive_response: u64,
  pub unsubscribed:      u64,
  /// Records whose (sender, receiver) pair has at least one open event.
  pub opened:            u64,
}

// ─── Unsubscribe ─────────────────────────────────────────────────────────────

/// Input to [`TrackingStore::unsubscribe`].
#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
  pub pair:            ContactPair,
  /// Written into `response` on the affected log row.
  pub response_marker: String,
  /// Written into `status_message` on the affected log row.
  pub status_message:  String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeOutcome {
  pub preference:        SubscriptionPreference,
  /// The log row stamped as unsubscribed, if a sent-but-unanswered row
  /// existed for the pair.
  pub updated_record_id: Option<i64>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Error bound for [`TrackingStore::Error`]. Lets callers tell a lost
/// identity-key race apart from every other failure.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The identity key that another writer inserted first, if that is what
  /// went wrong.
  fn conflict_key(&self) -> Option<&IdentityKey>;
}

/// Abstraction over a mailtrack storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait TrackingStore: Send + Sync {
  type Error: StoreError;

  // ── Import ────────────────────────────────────────────────────────────

  /// Look up existing records by identity key. Keys with no record are
  /// absent from the map. Large key sets are queried in chunks.
  fn fetch_by_keys<'a>(
    &'a self,
    keys: &'a [IdentityKey],
  ) -> impl Future<Output = Result<HashMap<IdentityKey, SendLogRecord>, Self::Error>>
  + Send
  + 'a;

  /// Look up stored preferences for `pairs`. Pairs with no row are absent.
  fn fetch_subscriptions<'a>(
    &'a self,
    pairs: &'a [ContactPair],
  ) -> impl Future<
    Output = Result<HashMap<ContactPair, SubscriptionPreference>, Self::Error>,
  > + Send
  + 'a;

  /// Commit an import plan in one transaction: opt-out upserts, then
  /// inserts, then updates. Any failure rolls back the whole plan.
  ///
  /// A concurrent insert of the same identity key surfaces as a conflict
  /// error distinct from other failures.
  fn apply_import(
    &self,
    plan: ImportPlan,
  ) -> impl Future<Output = Result<ImportSummary, Self::Error>> + Send + '_;

  // ── Tracking ──────────────────────────────────────────────────────────

  /// Append an open event. The `event_id` is assigned by the store.
  fn record_open(
    &self,
    input: NewOpenEvent,
  ) -> impl Future<Output = Result<OpenEvent, Self::Error>> + Send + '_;

  fn get_subscription(
    &self,
    pair: ContactPair,
  ) -> impl Future<Output = Result<Option<SubscriptionPreference>, Self::Error>>
  + Send
  + '_;

  /// Opt `pair` out and stamp the latest sent-but-unanswered log row for the
  /// pair, if any. Never inserts a log row. Idempotent.
  fn unsubscribe(
    &self,
    request: UnsubscribeRequest,
  ) -> impl Future<Output = Result<UnsubscribeOutcome, Self::Error>> + Send + '_;

  // ── Reports ───────────────────────────────────────────────────────────

  /// Matching records, newest `sent_at` first.
  fn list_send_logs<'a>(
    &'a self,
    query: &'a LogQuery,
  ) -> impl Future<Output = Result<Page<SendLogRecord>, Self::Error>> + Send + 'a;

  fn summarize_send_logs<'a>(
    &'a self,
    query: &'a LogQuery,
  ) -> impl Future<Output = Result<LogSummary, Self::Error>> + Send + 'a;

  /// Matching open events, newest first.
  fn list_open_events<'a>(
    &'a self,
    query: &'a OpenQuery,
  ) -> impl Future<Output = Result<Page<OpenEvent>, Self::Error>> + Send + 'a;

  /// Matching preferences, most recently updated first.
  fn list_subscriptions<'a>(
    &'a self,
    query: &'a SubscriptionQuery,
  ) -> impl Future<Output = Result<Page<SubscriptionPreference>, Self::Error>>
  + Send
  + 'a;
}
