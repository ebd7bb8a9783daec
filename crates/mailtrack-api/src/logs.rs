//! Handler for `GET /logs`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/logs` | Filters: `date`, `date_from`, `date_to`, `sender`, `receiver`, `response_kind`, `campaign_type`; paging: `page`, `per_page` |
//!
//! The response carries the requested page plus summary counts over every
//! record matching the filters.

use axum::{
  Json,
  extract::{Query, State},
};
use mailtrack_core::{
  record::CampaignType,
  response::ResponseKind,
  store::{LogQuery, TrackingStore},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  ApiError, ApiState, envelope,
  params::{pagination, parse_date, parse_with, present, split_page},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub date:          Option<String>,
  pub date_from:     Option<String>,
  pub date_to:       Option<String>,
  pub sender:        Option<String>,
  pub receiver:      Option<String>,
  pub response_kind: Option<String>,
  pub campaign_type: Option<String>,
  pub page:          Option<String>,
  pub per_page:      Option<String>,
}

impl ListParams {
  pub fn into_query(self) -> Result<LogQuery, ApiError> {
    let query = LogQuery {
      date:          parse_date("date", &self.date)?,
      date_from:     parse_date("date_from", &self.date_from)?,
      date_to:       parse_date("date_to", &self.date_to)?,
      sender:        present(&self.sender).map(str::to_owned),
      receiver:      present(&self.receiver).map(str::to_owned),
      response_kind: parse_with("response_kind", &self.response_kind, ResponseKind::parse)?,
      campaign_type: parse_with("campaign_type", &self.campaign_type, CampaignType::parse)?,
      pagination:    pagination(&self.page, &self.per_page)?,
    };
    query.validate()?;
    Ok(query)
  }
}

/// `GET /logs`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: TrackingStore,
{
  let query = params.into_query()?;

  let page = state
    .store
    .list_send_logs(&query)
    .await
    .map_err(ApiError::from_store)?;
  let summary = state
    .store
    .summarize_send_logs(&query)
    .await
    .map_err(ApiError::from_store)?;

  let (logs, pagination) = split_page(page);
  Ok(envelope(
    "Logs retrieved",
    json!({ "logs": logs, "summary": summary, "pagination": pagination }),
  ))
}
