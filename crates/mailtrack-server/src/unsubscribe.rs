//! Unsubscribe flow.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/track/unsub?k=&from=&to=` | Confirmation page; never mutates |
//! | `POST` | `/track/unsub` | JSON or form body; opts the pair out |
//!
//! `POST` accepts `from`/`sender` for the sender, `to`/`email` for the
//! receiver and an optional `k`. JSON callers get the API envelope back; the
//! confirmation page's form gets a small HTML page.

use askama::Template;
use axum::{
  Form, Json,
  extract::{FromRequest, Query, Request, State},
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
};
use mailtrack_api::{ApiError, envelope};
use mailtrack_core::{
  identity::normalize_email,
  response::LINK_UNSUBSCRIBE_STATUS_MESSAGE,
  store::{TrackingStore, UnsubscribeRequest},
  subscription::ContactPair,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmParams {
  pub k:    Option<String>,
  pub from: Option<String>,
  pub to:   Option<String>,
}

/// Body of `POST /track/unsub`. The first non-empty alias wins.
#[derive(Debug, Default, Deserialize)]
pub struct UnsubPayload {
  pub from:   Option<String>,
  pub sender: Option<String>,
  pub to:     Option<String>,
  pub email:  Option<String>,
  pub k:      Option<String>,
}

impl UnsubPayload {
  fn sender(&self) -> String { first_address(&[&self.from, &self.sender]) }

  fn receiver(&self) -> String { first_address(&[&self.to, &self.email]) }

  fn send_key(&self) -> Option<String> {
    self
      .k
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
  }
}

fn first_address(candidates: &[&Option<String>]) -> String {
  candidates
    .iter()
    .filter_map(|c| c.as_deref())
    .map(normalize_email)
    .find(|s| !s.is_empty())
    .unwrap_or_default()
}

// ─── Templates ────────────────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "unsubscribe_confirm.html")]
struct ConfirmTemplate<'a> {
  send_key:   &'a str,
  sender:     &'a str,
  receiver:   &'a str,
  cancel_url: &'a str,
}

#[derive(Template)]
#[template(path = "unsubscribe_notice.html")]
struct NoticeTemplate<'a> {
  title:   &'a str,
  message: &'a str,
}

fn render_html<T: Template>(status: StatusCode, tpl: T) -> Response {
  match tpl.render() {
    Ok(html) => (status, Html(html)).into_response(),
    Err(e) => {
      error!(error = %e, "template render failed");
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
  }
}

fn notice(status: StatusCode, title: &str, message: &str) -> Response {
  render_html(status, NoticeTemplate { title, message })
}

// ─── GET ──────────────────────────────────────────────────────────────────────

/// `GET /track/unsub`: render the confirmation page.
pub async fn confirm<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ConfirmParams>,
) -> Response
where
  S: TrackingStore,
{
  let send_key = params.k.unwrap_or_default();
  let sender = normalize_email(params.from.as_deref().unwrap_or_default());
  let receiver = normalize_email(params.to.as_deref().unwrap_or_default());
  render_html(StatusCode::OK, ConfirmTemplate {
    send_key:   &send_key,
    sender:     &sender,
    receiver:   &receiver,
    cancel_url: &state.config.cancel_url,
  })
}

// ─── POST ─────────────────────────────────────────────────────────────────────

/// `POST /track/unsub`: opt the pair out.
pub async fn commit<S>(State(state): State<AppState<S>>, req: Request) -> Response
where
  S: TrackingStore,
{
  let wants_json = req
    .headers()
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

  // An unreadable body is treated like an empty one.
  let payload = if wants_json {
    Json::<UnsubPayload>::from_request(req, &())
      .await
      .map(|Json(p)| p)
      .unwrap_or_default()
  } else {
    Form::<UnsubPayload>::from_request(req, &())
      .await
      .map(|Form(p)| p)
      .unwrap_or_default()
  };

  let pair = ContactPair::new(&payload.sender(), &payload.receiver());
  let send_key = payload.send_key();

  if pair.is_incomplete() {
    return if wants_json {
      ApiError::bad_request("Missing sender/receiver").into_response()
    } else {
      notice(StatusCode::BAD_REQUEST, "Unsubscribe failed", "Missing sender/receiver.")
    };
  }

  let request = UnsubscribeRequest {
    pair:            pair.clone(),
    response_marker: state.classifier.unsubscribed_marker.clone(),
    status_message:  LINK_UNSUBSCRIBE_STATUS_MESSAGE.to_owned(),
  };

  match state.store.unsubscribe(request).await {
    Ok(outcome) => {
      info!(
        sender = %pair.sender,
        receiver = %pair.receiver,
        updated_record_id = ?outcome.updated_record_id,
        "unsubscribed"
      );
      if wants_json {
        envelope(
          "Unsubscribed successfully",
          json!({
            "sender": pair.sender,
            "receiver": pair.receiver,
            "is_subscribed": outcome.preference.is_subscribed,
            "updated_record_id": outcome.updated_record_id,
            "k": send_key,
          }),
        )
        .into_response()
      } else {
        notice(
          StatusCode::OK,
          "Unsubscribed",
          "You have been unsubscribed and will not receive further emails from this sender.",
        )
      }
    }
    Err(e) if wants_json => ApiError::from_store(e).into_response(),
    Err(e) => {
      error!(error = %e, "unsubscribe failed");
      notice(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Unsubscribe failed",
        "Please try again later.",
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{Router, body::Body, http::Request};
  use mailtrack_core::{
    record::CampaignType,
    response::ResponseKind,
    store::{LogQuery, SubscriptionQuery},
  };
  use mailtrack_store_sqlite::SqliteStore;
  use serde_json::Value;
  use tower::ServiceExt as _;

  use super::*;
  use crate::{ServerConfig, router};

  async fn setup() -> (Arc<SqliteStore>, Router) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let config = ServerConfig {
      cancel_url: "https://example.com/?a=1&b=2".into(),
      ..ServerConfig::default()
    };
    let app = router(AppState::new(store.clone(), config));
    (store, app)
  }

  async fn call(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
  }

  fn post_json(body: Value) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri("/track/unsub")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap()
  }

  fn post_form(body: &str) -> Request<Body> {
    Request::builder()
      .method("POST")
      .uri("/track/unsub")
      .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Body::from(body.to_owned()))
      .unwrap()
  }

  async fn opted_out(store: &SqliteStore) -> u64 {
    let query = SubscriptionQuery { is_subscribed: Some(false), ..Default::default() };
    store.list_subscriptions(&query).await.unwrap().total_records
  }

  #[test]
  fn notice_escapes_markup() {
    let html = NoticeTemplate { title: "<b>Done</b>", message: r#"a "quoted" & more"# }
      .render()
      .unwrap();
    assert!(html.contains("&lt;b&gt;Done&lt;/b&gt;"));
    assert!(html.contains("a &quot;quoted&quot; &amp; more"));
    assert!(!html.contains("<b>Done"));
  }

  #[tokio::test]
  async fn confirm_page_escapes_and_never_mutates() {
    let (store, app) = setup().await;
    let req = Request::builder()
      .uri("/track/unsub?k=%3Cb%3E&from=A@x.com&to=%22evil%22@y.com")
      .body(Body::empty())
      .unwrap();
    let (status, html) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains(r#"name="k" value="&lt;b&gt;""#));
    assert!(html.contains(r#"name="from" value="a@x.com""#));
    assert!(html.contains("&quot;evil&quot;@y.com"));
    assert!(html.contains("a=1&amp;b=2"));
    assert!(html.contains("<b>Receiver:</b> &quot;evil&quot;@y.com"));
    assert!(html.contains("Yes, unsubscribe"));
    assert_eq!(opted_out(&store).await, 0);
  }

  #[tokio::test]
  async fn json_post_is_idempotent() {
    let (store, app) = setup().await;
    let body = json!({ "sender": "A@x.com", "email": "b@y.com", "k": "abc" });

    let (status, text) = call(&app, post_json(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["status"], "success");
    assert_eq!(v["data"]["sender"], "a@x.com");
    assert_eq!(v["data"]["is_subscribed"], false);
    assert_eq!(v["data"]["k"], "abc");
    assert_eq!(v["data"]["updated_record_id"], Value::Null);

    let (status, _) = call(&app, post_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opted_out(&store).await, 1);
  }

  #[tokio::test]
  async fn form_post_returns_html() {
    let (store, app) = setup().await;
    let (status, html) = call(&app, post_form("k=abc&from=a%40x.com&to=b%40y.com")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("You have been unsubscribed"));
    assert_eq!(opted_out(&store).await, 1);
  }

  #[tokio::test]
  async fn missing_addresses_are_rejected() {
    let (store, app) = setup().await;

    let (status, text) = call(&app, post_json(json!({ "from": "a@x.com", "to": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let v: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["message"], "Missing sender/receiver");

    let (status, html) = call(&app, post_form("from=a%40x.com")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(html.contains("Missing sender"));

    let (status, _) = call(&app, post_json(json!("not an object"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(opted_out(&store).await, 0);
  }

  #[tokio::test]
  async fn stamps_latest_unanswered_send() {
    let (store, app) = setup().await;
    let csv = "Sender Email,Receiver Email,First Name,Company,Status,StatusMessage,SentAt,Responds,Subject,Body\n\
               a@x.com,b@y.com,Bo,Acme,SENT,,2024-01-01 10:00:00,,Hi,Body\n\
               a@x.com,b@y.com,Bo,Acme,SENT,,2024-01-05 10:00:00,,Hi again,Body\n";
    let rows = mailtrack_sheet::read_bytes(csv.as_bytes()).unwrap();
    let summary = mailtrack_api::run_import(
      store.as_ref(),
      &Default::default(),
      rows,
      CampaignType::Outreach,
    )
    .await
    .unwrap();
    assert_eq!(summary.inserted, 2);

    let (status, _) = call(&app, post_json(json!({ "from": "a@x.com", "to": "b@y.com" }))).await;
    assert_eq!(status, StatusCode::OK);

    let logs = store.list_send_logs(&LogQuery::default()).await.unwrap();
    let latest = &logs.items[0];
    assert_eq!(latest.response_kind, ResponseKind::Unsubscribed);
    assert_eq!(
      latest.fields.status_message.as_deref(),
      Some(LINK_UNSUBSCRIBE_STATUS_MESSAGE)
    );
    assert_eq!(logs.items[1].response_kind, ResponseKind::NoResponse);
  }
}
