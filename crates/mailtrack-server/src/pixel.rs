//! Open-tracking pixel.
//!
//! `GET /track/open.gif?k=<token>&st=<send epoch>&from=<sender>&to=<receiver>`
//!
//! Always answers with the same uncacheable 1x1 GIF. An open event is recorded
//! only when the token and send epoch are present and enough time has passed
//! since the send for the fetch not to be a delivery-time image prefetch.

use axum::{
  extract::{Query, Request, State, rejection::QueryRejection},
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use mailtrack_core::{
  identity::normalize_email,
  open_event::{NewOpenEvent, open_is_admissible},
  store::TrackingStore,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{AppState, client_ip};

/// 1x1 transparent GIF.
const PIXEL_GIF_BASE64: &str = "R0lGODlhAQABAIAAAAAAAP///ywAAAAAAQABAAACAUwAOw==";

#[derive(Debug, Default, Deserialize)]
pub struct PixelParams {
  pub k:    Option<String>,
  pub st:   Option<String>,
  pub from: Option<String>,
  pub to:   Option<String>,
}

/// Parse a send epoch. Fractional seconds are truncated; anything
/// unparseable is `0`.
pub fn parse_epoch(raw: Option<&str>) -> i64 {
  let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
    return 0;
  };
  if let Ok(n) = s.parse::<i64>() {
    return n;
  }
  match s.parse::<f64>() {
    Ok(f) if f.is_finite() => f.trunc() as i64,
    _ => 0,
  }
}

/// The pixel response: GIF body plus cache-defeating headers.
pub fn pixel_response() -> Response {
  // The constant is valid base64; an empty body is still a 200.
  let body = B64.decode(PIXEL_GIF_BASE64).unwrap_or_default();
  let mut res = body.into_response();
  let headers = res.headers_mut();
  headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
  headers.insert(
    header::CACHE_CONTROL,
    HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
  );
  headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
  headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
  res
}

/// `GET /track/open.gif`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  query: Result<Query<PixelParams>, QueryRejection>,
  req: Request,
) -> Response
where
  S: TrackingStore,
{
  // A query that does not deserialize still gets the image.
  let params = match query {
    Ok(Query(params)) => params,
    Err(rejection) => {
      debug!(error = %rejection, "unreadable pixel query");
      PixelParams::default()
    }
  };
  let send_key = params.k.as_deref().map(str::trim).unwrap_or_default().to_owned();
  let sent_epoch = parse_epoch(params.st.as_deref());
  let now = Utc::now();

  if !open_is_admissible(
    &send_key,
    sent_epoch,
    now.timestamp(),
    state.config.min_open_delay_secs,
  ) {
    debug!(send_key, sent_epoch, "open not recorded");
    return pixel_response();
  }

  let event = NewOpenEvent {
    sender: normalize_email(params.from.as_deref().unwrap_or_default()),
    receiver: normalize_email(params.to.as_deref().unwrap_or_default()),
    send_key,
    sent_epoch,
    opened_at: now,
    client_ip: client_ip(req.headers(), req.extensions()),
    user_agent: req
      .headers()
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned),
  };

  if let Err(e) = state.store.record_open(event).await {
    warn!(error = %e, "failed to record open event");
  }

  pixel_response()
}
