//! [`SqliteStore`] is the SQLite implementation of [`TrackingStore`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use mailtrack_core::{
  identity::{IdentityKey, format_sent_at},
  open_event::{NewOpenEvent, OpenEvent},
  reconcile::{ImportPlan, ImportSummary},
  record::SendLogRecord,
  response::ResponseKind,
  store::{
    LogQuery, LogSummary, OpenQuery, Page, SubscriptionQuery, TrackingStore,
    UnsubscribeOutcome, UnsubscribeRequest,
  },
  subscription::{ContactPair, SubscriptionPreference},
};
use rusqlite::{OptionalExtension as _, params, params_from_iter};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{
    OPEN_EVENT_COLUMNS, PREFERENCE_COLUMNS, RawOpenEvent, RawPreference, RawSendLog,
    SEND_LOG_COLUMNS, encode_dt,
  },
  error::DuplicateKey,
  filter,
  schema::SCHEMA,
};

/// Maximum number of identity keys bound into one `IN (...)` lookup.
pub const KEY_CHUNK_SIZE: usize = 500;

/// Pairs per subscription lookup; each pair binds two parameters.
const PAIR_CHUNK_SIZE: usize = 250;

const UPSERT_OPT_OUT: &str = "
  INSERT INTO subscription_preferences (sender, receiver, is_subscribed, updated_at)
  VALUES (?1, ?2, 0, ?3)
  ON CONFLICT (sender, receiver) DO UPDATE
    SET is_subscribed = 0, updated_at = excluded.updated_at
    WHERE is_subscribed != 0";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A mailtrack store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── TrackingStore impl ──────────────────────────────────────────────────────

impl TrackingStore for SqliteStore {
  type Error = Error;

  // ── Import ────────────────────────────────────────────────────────────────

  async fn fetch_by_keys(
    &self,
    keys: &[IdentityKey],
  ) -> Result<HashMap<IdentityKey, SendLogRecord>> {
    if keys.is_empty() {
      return Ok(HashMap::new());
    }
    let keys: Vec<String> = keys.iter().map(|k| k.as_str().to_owned()).collect();

    let raws: Vec<RawSendLog> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        for chunk in keys.chunks(KEY_CHUNK_SIZE) {
          let sql = format!(
            "SELECT {SEND_LOG_COLUMNS} FROM send_logs WHERE identity_key IN ({})",
            placeholders(chunk.len()),
          );
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(params_from_iter(chunk.iter()), RawSendLog::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let record = raw.into_record()?;
        Ok((record.identity_key.clone(), record))
      })
      .collect()
  }

  async fn fetch_subscriptions(
    &self,
    pairs: &[ContactPair],
  ) -> Result<HashMap<ContactPair, SubscriptionPreference>> {
    if pairs.is_empty() {
      return Ok(HashMap::new());
    }
    let pairs = pairs.to_vec();

    let raws: Vec<RawPreference> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        for chunk in pairs.chunks(PAIR_CHUNK_SIZE) {
          let sql = format!(
            "SELECT {PREFERENCE_COLUMNS} FROM subscription_preferences WHERE {}",
            vec!["(sender = ? AND receiver = ?)"; chunk.len()].join(" OR "),
          );
          let values = chunk
            .iter()
            .flat_map(|p| [p.sender.as_str(), p.receiver.as_str()]);
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(params_from_iter(values), RawPreference::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let pref = raw.into_preference()?;
        Ok((pref.pair(), pref))
      })
      .collect()
  }

  async fn apply_import(&self, plan: ImportPlan) -> Result<ImportSummary> {
    let ImportPlan {
      inserts,
      updates,
      opt_outs,
      summary,
    } = plan;
    let now = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut upsert = tx.prepare(UPSERT_OPT_OUT)?;
          for pair in &opt_outs {
            upsert.execute(params![pair.sender, pair.receiver, now])?;
          }

          let mut insert = tx.prepare(
            "INSERT INTO send_logs (
               identity_key, sender, receiver, campaign_type, sent_at,
               first_name, company, status, status_message, response, subject, body,
               response_kind, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
          )?;
          for n in &inserts {
            let result = insert.execute(params![
              n.identity_key.as_str(),
              n.sender,
              n.receiver,
              n.campaign_type.as_str(),
              format_sent_at(n.sent_at),
              n.fields.first_name,
              n.fields.company,
              n.fields.status,
              n.fields.status_message,
              n.fields.response,
              n.fields.subject,
              n.fields.body,
              n.response_kind.as_str(),
              now,
            ]);
            match result {
              Ok(_) => {}
              Err(e) if is_unique_violation(&e) => {
                return Err(tokio_rusqlite::Error::Other(Box::new(DuplicateKey(
                  n.identity_key.clone(),
                ))));
              }
              Err(e) => return Err(e.into()),
            }
          }

          let mut update = tx.prepare(
            "UPDATE send_logs SET
               first_name = ?2, company = ?3, status = ?4, status_message = ?5,
               response = ?6, subject = ?7, body = ?8, response_kind = ?9,
               updated_at = ?10
             WHERE record_id = ?1",
          )?;
          for u in &updates {
            update.execute(params![
              u.record_id,
              u.fields.first_name,
              u.fields.company,
              u.fields.status,
              u.fields.status_message,
              u.fields.response,
              u.fields.subject,
              u.fields.body,
              u.response_kind.as_str(),
              now,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await
      .map_err(Error::from_call)?;

    debug!(
      import_id = %summary.import_id,
      inserted = summary.inserted,
      updated = summary.updated,
      "import committed"
    );
    Ok(summary)
  }

  // ── Tracking ──────────────────────────────────────────────────────────────

  async fn record_open(&self, input: NewOpenEvent) -> Result<OpenEvent> {
    let opened_at = encode_dt(input.opened_at);
    let row = input.clone();

    let event_id: i64 = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO open_events (
             sender, receiver, send_key, sent_epoch, opened_at, client_ip, user_agent
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![
            row.sender,
            row.receiver,
            row.send_key,
            row.sent_epoch,
            opened_at,
            row.client_ip,
            row.user_agent,
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(OpenEvent {
      event_id,
      sender: input.sender,
      receiver: input.receiver,
      send_key: input.send_key,
      sent_epoch: input.sent_epoch,
      opened_at: input.opened_at,
      client_ip: input.client_ip,
      user_agent: input.user_agent,
    })
  }

  async fn get_subscription(
    &self,
    pair: ContactPair,
  ) -> Result<Option<SubscriptionPreference>> {
    let raw: Option<RawPreference> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {PREFERENCE_COLUMNS} FROM subscription_preferences
                 WHERE sender = ?1 AND receiver = ?2"
              ),
              params![pair.sender, pair.receiver],
              RawPreference::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPreference::into_preference).transpose()
  }

  async fn unsubscribe(&self, request: UnsubscribeRequest) -> Result<UnsubscribeOutcome> {
    let UnsubscribeRequest {
      pair,
      response_marker,
      status_message,
    } = request;
    let now = encode_dt(Utc::now());

    let (raw, updated_record_id): (RawPreference, Option<i64>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(UPSERT_OPT_OUT, params![pair.sender, pair.receiver, now])?;

        // Latest row that was sent and has not been answered yet.
        let target: Option<i64> = tx
          .query_row(
            "SELECT record_id FROM send_logs
             WHERE sender = ?1 AND receiver = ?2
               AND UPPER(TRIM(COALESCE(status, ''))) = 'SENT'
               AND response_kind = ?3
             ORDER BY sent_at DESC, record_id DESC
             LIMIT 1",
            params![pair.sender, pair.receiver, ResponseKind::NoResponse.as_str()],
            |row| row.get(0),
          )
          .optional()?;

        if let Some(record_id) = target {
          tx.execute(
            "UPDATE send_logs
               SET response = ?2, status_message = ?3, response_kind = ?4, updated_at = ?5
             WHERE record_id = ?1",
            params![
              record_id,
              response_marker,
              status_message,
              ResponseKind::Unsubscribed.as_str(),
              now,
            ],
          )?;
        }

        let raw = tx.query_row(
          &format!(
            "SELECT {PREFERENCE_COLUMNS} FROM subscription_preferences
             WHERE sender = ?1 AND receiver = ?2"
          ),
          params![pair.sender, pair.receiver],
          RawPreference::from_row,
        )?;

        tx.commit()?;
        Ok((raw, target))
      })
      .await?;

    Ok(UnsubscribeOutcome {
      preference: raw.into_preference()?,
      updated_record_id,
    })
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  async fn list_send_logs(&self, query: &LogQuery) -> Result<Page<SendLogRecord>> {
    query.validate()?;
    let f = filter::send_logs(query);
    let pagination = query.pagination;

    let (total, raws): (i64, Vec<RawSendLog>) = self
      .conn
      .call(move |conn| {
        let where_clause = f.where_clause();
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM send_logs {where_clause}"),
          params_from_iter(f.values()),
          |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {SEND_LOG_COLUMNS} FROM send_logs {where_clause}
           ORDER BY sent_at DESC, record_id DESC
           LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
          .query_map(params_from_iter(f.paged_values(pagination)), RawSendLog::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawSendLog::into_record)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total as u64))
  }

  async fn summarize_send_logs(&self, query: &LogQuery) -> Result<LogSummary> {
    query.validate()?;
    let f = filter::send_logs(query);

    let counts: [i64; 6] = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT
             COUNT(*),
             COALESCE(SUM(response_kind = 'no_response'), 0),
             COALESCE(SUM(response_kind = 'responded'), 0),
             COALESCE(SUM(response_kind = 'positive_response'), 0),
             COALESCE(SUM(response_kind = 'unsubscribed'), 0),
             COALESCE(SUM(EXISTS (
               SELECT 1 FROM open_events o
               WHERE o.sender = s.sender AND o.receiver = s.receiver
             )), 0)
           FROM send_logs s {}",
          f.where_clause(),
        );
        Ok(conn.query_row(&sql, params_from_iter(f.values()), |row| {
          Ok([
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ])
        })?)
      })
      .await?;

    let [total, no_response, responded, positive_response, unsubscribed, opened] =
      counts.map(|n| n as u64);
    Ok(LogSummary {
      total,
      no_response,
      responded,
      positive_response,
      unsubscribed,
      opened,
    })
  }

  async fn list_open_events(&self, query: &OpenQuery) -> Result<Page<OpenEvent>> {
    let f = filter::open_events(query);
    let pagination = query.pagination;

    let (total, raws): (i64, Vec<RawOpenEvent>) = self
      .conn
      .call(move |conn| {
        let where_clause = f.where_clause();
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM open_events {where_clause}"),
          params_from_iter(f.values()),
          |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {OPEN_EVENT_COLUMNS} FROM open_events {where_clause}
           ORDER BY opened_at DESC, event_id DESC
           LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
          .query_map(params_from_iter(f.paged_values(pagination)), RawOpenEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawOpenEvent::into_event)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total as u64))
  }

  async fn list_subscriptions(
    &self,
    query: &SubscriptionQuery,
  ) -> Result<Page<SubscriptionPreference>> {
    let f = filter::subscriptions(query);
    let pagination = query.pagination;

    let (total, raws): (i64, Vec<RawPreference>) = self
      .conn
      .call(move |conn| {
        let where_clause = f.where_clause();
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM subscription_preferences {where_clause}"),
          params_from_iter(f.values()),
          |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {PREFERENCE_COLUMNS} FROM subscription_preferences {where_clause}
           ORDER BY updated_at DESC, sender, receiver
           LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
          .query_map(params_from_iter(f.paged_values(pagination)), RawPreference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawPreference::into_preference)
      .collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total as u64))
  }
}
