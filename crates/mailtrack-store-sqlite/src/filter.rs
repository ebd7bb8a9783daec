//! Dynamic `WHERE` clause builder for the report queries.

use mailtrack_core::{
  identity::normalize_email,
  store::{LogQuery, OpenQuery, Pagination, SubscriptionQuery},
};
use rusqlite::types::Value;

/// Conditions joined with `AND`, bound positionally with `?`.
#[derive(Debug, Default)]
pub struct Filter {
  conds:  Vec<&'static str>,
  values: Vec<Value>,
}

impl Filter {
  fn push(&mut self, cond: &'static str, value: impl Into<Value>) {
    self.conds.push(cond);
    self.values.push(value.into());
  }

  fn push_opt<V: Into<Value>>(&mut self, cond: &'static str, value: Option<V>) {
    if let Some(v) = value {
      self.push(cond, v);
    }
  }

  pub fn where_clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  pub fn values(&self) -> &[Value] { &self.values }

  /// The filter values followed by `LIMIT` and `OFFSET`.
  pub fn paged_values(&self, pagination: Pagination) -> Vec<Value> {
    let mut values = self.values.clone();
    values.push(Value::Integer(pagination.limit() as i64));
    values.push(Value::Integer(pagination.offset() as i64));
    values
  }
}

fn address(s: Option<&str>) -> Option<String> {
  s.map(normalize_email).filter(|s| !s.is_empty())
}

pub fn send_logs(q: &LogQuery) -> Filter {
  let mut f = Filter::default();
  f.push_opt("date(sent_at) = ?", q.date.map(|d| d.to_string()));
  f.push_opt("date(sent_at) >= ?", q.date_from.map(|d| d.to_string()));
  f.push_opt("date(sent_at) <= ?", q.date_to.map(|d| d.to_string()));
  f.push_opt("sender = ?", address(q.sender.as_deref()));
  f.push_opt("receiver = ?", address(q.receiver.as_deref()));
  f.push_opt("response_kind = ?", q.response_kind.map(|k| k.as_str().to_owned()));
  f.push_opt("campaign_type = ?", q.campaign_type.map(|c| c.as_str().to_owned()));
  f
}

pub fn open_events(q: &OpenQuery) -> Filter {
  let mut f = Filter::default();
  f.push_opt("sender = ?", address(q.sender.as_deref()));
  f.push_opt("receiver = ?", address(q.receiver.as_deref()));
  f.push_opt(
    "send_key = ?",
    q.send_key.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned),
  );
  f
}

pub fn subscriptions(q: &SubscriptionQuery) -> Filter {
  let mut f = Filter::default();
  f.push_opt("sender = ?", address(q.sender.as_deref()));
  f.push_opt("receiver = ?", address(q.receiver.as_deref()));
  f.push_opt("is_subscribed = ?", q.is_subscribed.map(i64::from));
  f
}
