//! Handler for `GET /subscriptions`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subscriptions` | Filters: `sender`, `receiver`, `subscribed=true\|false`; paging: `page`, `per_page` |

use axum::{
  Json,
  extract::{Query, State},
};
use mailtrack_core::store::{SubscriptionQuery, TrackingStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  ApiError, ApiState, envelope,
  params::{pagination, parse_opt, present, split_page},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub sender:     Option<String>,
  pub receiver:   Option<String>,
  pub subscribed: Option<String>,
  pub page:       Option<String>,
  pub per_page:   Option<String>,
}

/// `GET /subscriptions`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: TrackingStore,
{
  let query = SubscriptionQuery {
    sender:        present(&params.sender).map(str::to_owned),
    receiver:      present(&params.receiver).map(str::to_owned),
    is_subscribed: parse_opt::<bool>("subscribed", &params.subscribed)?,
    pagination:    pagination(&params.page, &params.per_page)?,
  };

  let page = state
    .store
    .list_subscriptions(&query)
    .await
    .map_err(ApiError::from_store)?;

  let (subscriptions, pagination) = split_page(page);
  Ok(envelope(
    "Subscriptions retrieved",
    json!({ "subscriptions": subscriptions, "pagination": pagination }),
  ))
}
