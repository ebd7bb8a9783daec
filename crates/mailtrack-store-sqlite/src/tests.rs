//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, TimeZone as _, Utc};
use mailtrack_core::{
  identity::IdentityKey,
  open_event::NewOpenEvent,
  reconcile::{CandidateRow, ImportPlan, ImportSummary, plan, prepare},
  record::CampaignType,
  response::{LINK_UNSUBSCRIBE_STATUS_MESSAGE, ResponseClassifier, ResponseKind},
  store::{
    LogQuery, OpenQuery, Pagination, SubscriptionQuery, TrackingStore, UnsubscribeRequest,
  },
  subscription::ContactPair,
};

use crate::{Error, KEY_CHUNK_SIZE, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn row(receiver: &str, sent_at: &str, response: &str) -> CandidateRow {
  CandidateRow {
    sender:         "a@x.com".into(),
    receiver:       receiver.into(),
    first_name:     "Ann".into(),
    company:        "Acme".into(),
    status:         "SENT".into(),
    status_message: "".into(),
    sent_at:        sent_at.into(),
    response:       response.into(),
    subject:        "Hello".into(),
    body:           "Body".into(),
  }
}

async fn build_plan(s: &SqliteStore, rows: Vec<CandidateRow>, campaign: CampaignType) -> ImportPlan {
  let prepared = prepare(rows, campaign);
  let subs = s.fetch_subscriptions(&prepared.pairs()).await.unwrap();
  let existing = s.fetch_by_keys(&prepared.keys()).await.unwrap();
  plan(prepared, &ResponseClassifier::default(), &subs, &existing)
}

async fn import(s: &SqliteStore, rows: Vec<CandidateRow>) -> ImportSummary {
  let p = build_plan(s, rows, CampaignType::Outreach).await;
  s.apply_import(p).await.unwrap()
}

fn unsubscribe_request(sender: &str, receiver: &str) -> UnsubscribeRequest {
  UnsubscribeRequest {
    pair:            ContactPair::new(sender, receiver),
    response_marker: "Unsubscribed".into(),
    status_message:  LINK_UNSUBSCRIBE_STATUS_MESSAGE.into(),
  }
}

fn sample() -> Vec<CandidateRow> {
  vec![
    row("one@y.com", "2024-01-01 10:00:00", ""),
    row("two@y.com", "2024-01-02 10:00:00", "Sounds good"),
    row("three@y.com", "2024-01-03 10:00:00", "Who is this?"),
  ]
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn import_inserts_then_is_idempotent() {
  let s = store().await;

  let first = import(&s, sample()).await;
  assert_eq!(first.inserted, 3);

  let second = import(&s, sample()).await;
  assert_eq!(second.inserted, 0);
  assert_eq!(second.updated, 0);
  assert_eq!(second.duplicates, 3);

  let page = s.list_send_logs(&LogQuery::default()).await.unwrap();
  assert_eq!(page.total_records, 3);
}

#[tokio::test]
async fn changed_response_updates_in_place() {
  let s = store().await;
  import(&s, sample()).await;

  let mut rows = sample();
  rows[0].response = "Let's talk".into();
  let summary = import(&s, rows).await;
  assert_eq!(summary.updated, 1);
  assert_eq!(summary.duplicates, 2);

  let q = LogQuery { receiver: Some("one@y.com".into()), ..Default::default() };
  let page = s.list_send_logs(&q).await.unwrap();
  assert_eq!(page.items.len(), 1);
  let rec = &page.items[0];
  assert_eq!(rec.fields.response.as_deref(), Some("Let's talk"));
  assert_eq!(rec.response_kind, ResponseKind::PositiveResponse);
  assert!(rec.updated_at >= rec.created_at);
}

#[tokio::test]
async fn fetch_by_keys_spans_chunks() {
  let s = store().await;
  let n = KEY_CHUNK_SIZE * 2 + 7;
  let rows: Vec<_> = (0..n)
    .map(|i| row(&format!("r{i}@y.com"), "2024-01-01 10:00:00", ""))
    .collect();
  let prepared = prepare(rows.clone(), CampaignType::Outreach);
  import(&s, rows).await;

  let mut keys = prepared.keys();
  keys.push(IdentityKey::from_stored("not-a-key"));
  let found = s.fetch_by_keys(&keys).await.unwrap();
  assert_eq!(found.len(), n);
  assert!(prepared.keys().iter().all(|k| found.contains_key(k)));
}

#[tokio::test]
async fn conflicting_insert_rolls_back_whole_plan() {
  let s = store().await;

  // Two plans built against the same empty state, as two concurrent imports
  // would see it.
  let first = build_plan(&s, vec![row("one@y.com", "2024-01-01 10:00:00", "")], CampaignType::Outreach).await;
  let second = build_plan(
    &s,
    vec![
      row("new@y.com", "2024-01-05 10:00:00", "not interested"),
      row("one@y.com", "2024-01-01 10:00:00", ""),
    ],
    CampaignType::Outreach,
  )
  .await;

  s.apply_import(first).await.unwrap();
  let err = s.apply_import(second).await.unwrap_err();
  assert!(err.is_conflict(), "unexpected error: {err}");
  assert!(matches!(err, Error::Conflict(_)));

  // Nothing from the failed plan was kept.
  let page = s.list_send_logs(&LogQuery::default()).await.unwrap();
  assert_eq!(page.total_records, 1);
  let subs = s.list_subscriptions(&SubscriptionQuery::default()).await.unwrap();
  assert_eq!(subs.total_records, 0);
}

#[tokio::test]
async fn opt_out_reply_is_persisted_and_overrides_later_imports() {
  let s = store().await;
  let mut rows = sample();
  rows[1].response = "Please remove me".into();
  let summary = import(&s, rows).await;
  assert_eq!(summary.opt_outs_detected, 1);

  let pref = s
    .get_subscription(ContactPair::new("a@x.com", "two@y.com"))
    .await
    .unwrap()
    .unwrap();
  assert!(pref.is_opted_out());

  let later = import(&s, vec![row("two@y.com", "2024-02-01 10:00:00", "Interested")]).await;
  assert_eq!(later.unsubscribed_overrides, 1);

  let q = LogQuery {
    receiver: Some("two@y.com".into()),
    date: NaiveDate::from_ymd_opt(2024, 2, 1),
    ..Default::default()
  };
  let page = s.list_send_logs(&q).await.unwrap();
  assert_eq!(page.items[0].fields.response.as_deref(), Some("Unsubscribed"));
}

// ─── Open events ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_and_list_opens() {
  let s = store().await;
  for (i, key) in ["k1", "k2", "k3"].iter().enumerate() {
    s.record_open(NewOpenEvent {
      sender:     "a@x.com".into(),
      receiver:   if i < 2 { "one@y.com".into() } else { "two@y.com".into() },
      send_key:   (*key).into(),
      sent_epoch: 1_700_000_000,
      opened_at:  Utc.timestamp_opt(1_700_000_100 + i as i64, 0).unwrap(),
      client_ip:  Some("10.0.0.1".into()),
      user_agent: None,
    })
    .await
    .unwrap();
  }

  let all = s.list_open_events(&OpenQuery::default()).await.unwrap();
  assert_eq!(all.total_records, 3);
  assert_eq!(all.items[0].send_key, "k3");

  let q = OpenQuery { receiver: Some("ONE@y.com".into()), ..Default::default() };
  assert_eq!(s.list_open_events(&q).await.unwrap().total_records, 2);

  let q = OpenQuery { send_key: Some("k2".into()), ..Default::default() };
  let page = s.list_open_events(&q).await.unwrap();
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.items[0].client_ip.as_deref(), Some("10.0.0.1"));
}

// ─── Unsubscribe ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_stamps_latest_unanswered_row_only() {
  let s = store().await;
  import(&s, vec![
    row("one@y.com", "2024-01-01 10:00:00", ""),
    row("one@y.com", "2024-01-08 10:00:00", "No Response Yet"),
    row("one@y.com", "2024-01-15 10:00:00", "Who is this?"),
  ])
  .await;

  let outcome = s.unsubscribe(unsubscribe_request("A@x.com", "one@y.com")).await.unwrap();
  assert!(outcome.preference.is_opted_out());
  let target = outcome.updated_record_id.expect("a row was stamped");

  let q = LogQuery { receiver: Some("one@y.com".into()), ..Default::default() };
  let page = s.list_send_logs(&q).await.unwrap();
  let stamped: Vec<_> = page
    .items
    .iter()
    .filter(|r| r.response_kind == ResponseKind::Unsubscribed)
    .collect();
  assert_eq!(stamped.len(), 1);
  assert_eq!(stamped[0].record_id, target);
  assert_eq!(stamped[0].sent_at.to_string(), "2024-01-08 10:00:00");
  assert_eq!(stamped[0].fields.status_message.as_deref(), Some(LINK_UNSUBSCRIBE_STATUS_MESSAGE));
  assert_eq!(page.total_records, 3);
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_never_inserts() {
  let s = store().await;

  let first = s.unsubscribe(unsubscribe_request("a@x.com", "nobody@y.com")).await.unwrap();
  assert_eq!(first.updated_record_id, None);
  let second = s.unsubscribe(unsubscribe_request("a@x.com", "nobody@y.com")).await.unwrap();
  assert_eq!(second.preference, first.preference);

  let logs = s.list_send_logs(&LogQuery::default()).await.unwrap();
  assert_eq!(logs.total_records, 0);
  let subs = s.list_subscriptions(&SubscriptionQuery::default()).await.unwrap();
  assert_eq!(subs.total_records, 1);
}

#[tokio::test]
async fn unsubscribe_ignores_rows_not_marked_sent() {
  let s = store().await;
  let mut r = row("one@y.com", "2024-01-01 10:00:00", "");
  r.status = "FAILED".into();
  import(&s, vec![r]).await;

  let outcome = s.unsubscribe(unsubscribe_request("a@x.com", "one@y.com")).await.unwrap();
  assert_eq!(outcome.updated_record_id, None);
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_and_paginates() {
  let s = store().await;
  let rows: Vec<_> = (1..=25)
    .map(|d| row(&format!("r{d}@y.com"), &format!("2024-03-{d:02} 09:00:00"), ""))
    .collect();
  import(&s, rows).await;

  let q = LogQuery {
    pagination: Pagination::new(Some(3), Some(10)).unwrap(),
    ..Default::default()
  };
  let page = s.list_send_logs(&q).await.unwrap();
  assert_eq!(page.total_records, 25);
  assert_eq!(page.total_pages, 3);
  assert_eq!(page.items.len(), 5);
  // Newest first, so the last page holds the earliest days.
  assert_eq!(page.items[4].receiver, "r1@y.com");

  let q = LogQuery {
    date_from: NaiveDate::from_ymd_opt(2024, 3, 10),
    date_to: NaiveDate::from_ymd_opt(2024, 3, 12),
    ..Default::default()
  };
  assert_eq!(s.list_send_logs(&q).await.unwrap().total_records, 3);

  let q = LogQuery { campaign_type: Some(CampaignType::Reminder), ..Default::default() };
  assert_eq!(s.list_send_logs(&q).await.unwrap().total_records, 0);
}

#[tokio::test]
async fn invalid_date_filter_is_rejected() {
  let s = store().await;
  let q = LogQuery {
    date_from: NaiveDate::from_ymd_opt(2024, 3, 12),
    date_to: NaiveDate::from_ymd_opt(2024, 3, 10),
    ..Default::default()
  };
  assert!(matches!(s.list_send_logs(&q).await, Err(Error::Core(_))));
}

#[tokio::test]
async fn summary_counts_by_kind_and_opens() {
  let s = store().await;
  let mut rows = sample();
  rows.push(row("four@y.com", "2024-01-04 10:00:00", "unsubscribe"));
  import(&s, rows).await;

  s.record_open(NewOpenEvent {
    sender:     "a@x.com".into(),
    receiver:   "one@y.com".into(),
    send_key:   "k".into(),
    sent_epoch: 1_700_000_000,
    opened_at:  Utc::now(),
    client_ip:  None,
    user_agent: None,
  })
  .await
  .unwrap();

  let all = s.summarize_send_logs(&LogQuery::default()).await.unwrap();
  assert_eq!(all.total, 4);
  assert_eq!(all.no_response, 1);
  assert_eq!(all.positive_response, 1);
  assert_eq!(all.responded, 1);
  assert_eq!(all.unsubscribed, 1);
  assert_eq!(all.opened, 1);

  let q = LogQuery { response_kind: Some(ResponseKind::Responded), ..Default::default() };
  let filtered = s.summarize_send_logs(&q).await.unwrap();
  assert_eq!(filtered.total, 1);
  assert_eq!(filtered.opened, 0);
}

#[tokio::test]
async fn subscriptions_filter_by_state() {
  let s = store().await;
  s.unsubscribe(unsubscribe_request("a@x.com", "one@y.com")).await.unwrap();
  s.unsubscribe(unsubscribe_request("a@x.com", "two@y.com")).await.unwrap();

  let q = SubscriptionQuery { is_subscribed: Some(false), ..Default::default() };
  assert_eq!(s.list_subscriptions(&q).await.unwrap().total_records, 2);
  let q = SubscriptionQuery { is_subscribed: Some(true), ..Default::default() };
  assert_eq!(s.list_subscriptions(&q).await.unwrap().total_records, 0);
}
