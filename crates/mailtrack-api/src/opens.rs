//! Handler for `GET /opens`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/opens` | Filters: `sender`, `receiver`, `k` (tracking token); paging: `page`, `per_page` |

use axum::{
  Json,
  extract::{Query, State},
};
use mailtrack_core::store::{OpenQuery, TrackingStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
  ApiError, ApiState, envelope,
  params::{pagination, present, split_page},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub sender:   Option<String>,
  pub receiver: Option<String>,
  pub k:        Option<String>,
  pub page:     Option<String>,
  pub per_page: Option<String>,
}

/// `GET /opens`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError>
where
  S: TrackingStore,
{
  let query = OpenQuery {
    sender:     present(&params.sender).map(str::to_owned),
    receiver:   present(&params.receiver).map(str::to_owned),
    send_key:   present(&params.k).map(str::to_owned),
    pagination: pagination(&params.page, &params.per_page)?,
  };

  let page = state
    .store
    .list_open_events(&query)
    .await
    .map_err(ApiError::from_store)?;

  let (opens, pagination) = split_page(page);
  Ok(envelope(
    "Open events retrieved",
    json!({ "opens": opens, "pagination": pagination }),
  ))
}
