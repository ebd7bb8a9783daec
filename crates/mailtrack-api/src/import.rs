//! Handler for `POST /import`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/import?campaign_type=<type>` | Body: CSV send log with the fixed header row |

use axum::{
  Json,
  body::Bytes,
  extract::{Query, State},
};
use mailtrack_core::{
  reconcile::{CandidateRow, ImportSummary, plan, prepare},
  record::CampaignType,
  response::ResponseClassifier,
  store::TrackingStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use strum::IntoEnumIterator as _;
use tracing::info;

use crate::{ApiError, ApiState, envelope};

#[derive(Debug, Deserialize)]
pub struct ImportParams {
  pub campaign_type: Option<String>,
}

/// `POST /import?campaign_type=<type>`: body is the CSV file.
pub async fn handler<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ImportParams>,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: TrackingStore,
{
  let campaign = parse_campaign(params.campaign_type.as_deref())?;
  let rows = mailtrack_sheet::read_bytes(&body).map_err(sheet_error)?;

  let summary = run_import(state.store.as_ref(), &state.classifier, rows, campaign).await?;
  Ok(envelope("Import completed", summary))
}

/// Reconcile `rows` against `store` and commit the result.
///
/// Shared by the HTTP handler and the server's offline import mode.
pub async fn run_import<S>(
  store: &S,
  classifier: &ResponseClassifier,
  rows: Vec<CandidateRow>,
  campaign: CampaignType,
) -> Result<ImportSummary, ApiError>
where
  S: TrackingStore,
{
  let prepared = prepare(rows, campaign);
  if prepared.is_empty() {
    return Err(ApiError::bad_request_with(
      "no valid rows to import",
      json!({
        "total_rows_in_file": prepared.total_rows,
        "skipped": prepared.skipped.len(),
        "skipped_rows": prepared.skipped,
      }),
    ));
  }

  let pairs = prepared.pairs();
  let keys = prepared.keys();
  let subscriptions = store
    .fetch_subscriptions(&pairs)
    .await
    .map_err(ApiError::from_store)?;
  let existing = store
    .fetch_by_keys(&keys)
    .await
    .map_err(ApiError::from_store)?;

  let plan = plan(prepared, classifier, &subscriptions, &existing);
  let summary = store
    .apply_import(plan)
    .await
    .map_err(ApiError::from_store)?;

  info!(
    import_id = %summary.import_id,
    campaign = %campaign,
    total = summary.total_rows_in_file,
    inserted = summary.inserted,
    updated = summary.updated,
    duplicates = summary.duplicates,
    skipped = summary.skipped,
    "import completed"
  );
  Ok(summary)
}

fn parse_campaign(raw: Option<&str>) -> Result<CampaignType, ApiError> {
  let allowed: Vec<_> = CampaignType::iter().map(|c| c.as_str()).collect();
  let allowed = json!({ "allowed": allowed });
  match raw.map(str::trim).filter(|s| !s.is_empty()) {
    None => Err(ApiError::bad_request_with("`campaign_type` is required", allowed)),
    Some(s) => CampaignType::parse(s)
      .map_err(|e| ApiError::bad_request_with(e.to_string(), allowed)),
  }
}

fn sheet_error(err: mailtrack_sheet::Error) -> ApiError {
  match err {
    mailtrack_sheet::Error::MissingHeaders(report) => ApiError::bad_request_with(
      format!("missing required headers: {}", report.missing.join(", ")),
      json!(report),
    ),
    other => ApiError::bad_request(other.to_string()),
  }
}
