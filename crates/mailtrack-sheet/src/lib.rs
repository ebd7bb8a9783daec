//! Tabular send-log reader.
//!
//! Reads a CSV export of a campaign sheet, validates its header row against
//! the fixed column set and yields one [`CandidateRow`] per data row. No
//! normalisation beyond header matching happens here; cell values are passed
//! through untouched for `mailtrack_core::reconcile::prepare`.

pub mod error;

use std::io;

use mailtrack_core::reconcile::CandidateRow;
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

// ─── Column set ──────────────────────────────────────────────────────────────

/// Column order here is documentation only; files may order columns freely.
pub const EXPECTED_HEADERS: [&str; 10] = [
  "Sender Email",
  "Receiver Email",
  "First Name",
  "Company",
  "Status",
  "StatusMessage",
  "SentAt",
  "Responds",
  "Subject",
  "Body",
];

#[derive(Clone, Copy)]
enum Column {
  Sender,
  Receiver,
  FirstName,
  Company,
  Status,
  StatusMessage,
  SentAt,
  Response,
  Subject,
  Body,
}

const COLUMNS: [Column; 10] = [
  Column::Sender,
  Column::Receiver,
  Column::FirstName,
  Column::Company,
  Column::Status,
  Column::StatusMessage,
  Column::SentAt,
  Column::Response,
  Column::Subject,
  Column::Body,
];

/// Result of comparing a file's header row with [`EXPECTED_HEADERS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderReport {
  #[serde(rename = "missing_headers")]
  pub missing:  Vec<String>,
  #[serde(rename = "extra_headers")]
  pub extra:    Vec<String>,
  pub expected: Vec<String>,
}

/// Trim and collapse internal whitespace runs to a single space. A leading
/// byte-order mark is dropped.
pub fn normalize_header(raw: &str) -> String {
  raw
    .trim_start_matches('\u{feff}')
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

/// Map each expected column to its position in `headers`, or report which
/// ones are missing. Matching is case-insensitive after normalisation.
fn locate_columns(headers: &[String]) -> Result<[usize; 10]> {
  let mut positions = [usize::MAX; 10];
  let mut missing = Vec::new();

  for (slot, expected) in EXPECTED_HEADERS.iter().enumerate() {
    match headers.iter().position(|h| h.eq_ignore_ascii_case(expected)) {
      Some(pos) => positions[slot] = pos,
      None => missing.push((*expected).to_owned()),
    }
  }

  if missing.is_empty() {
    return Ok(positions);
  }

  let extra = headers
    .iter()
    .filter(|h| {
      !h.is_empty() && !EXPECTED_HEADERS.iter().any(|e| h.eq_ignore_ascii_case(e))
    })
    .cloned()
    .collect();

  Err(Error::MissingHeaders(HeaderReport {
    missing,
    extra,
    expected: EXPECTED_HEADERS.iter().map(|s| (*s).to_owned()).collect(),
  }))
}

// ─── Reader ──────────────────────────────────────────────────────────────────

/// Read every data row of a CSV send log.
///
/// Rows whose cells are all blank are dropped and do not count towards the
/// file's row total. Short rows are padded with empty cells.
pub fn read_rows<R: io::Read>(input: R) -> Result<Vec<CandidateRow>> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .from_reader(input);

  let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
  if headers.iter().all(String::is_empty) {
    return Err(Error::Empty);
  }
  let positions = locate_columns(&headers)?;

  let mut rows = Vec::new();
  for record in reader.records() {
    let record = record?;
    if record.iter().all(|cell| cell.trim().is_empty()) {
      continue;
    }

    let mut row = CandidateRow::default();
    for (column, pos) in COLUMNS.iter().zip(positions) {
      let value = record.get(pos).unwrap_or_default().to_owned();
      *slot(&mut row, *column) = value;
    }
    rows.push(row);
  }

  Ok(rows)
}

/// Read from an in-memory buffer, as received in an upload body.
pub fn read_bytes(bytes: &[u8]) -> Result<Vec<CandidateRow>> { read_rows(bytes) }

fn slot(row: &mut CandidateRow, column: Column) -> &mut String {
  match column {
    Column::Sender => &mut row.sender,
    Column::Receiver => &mut row.receiver,
    Column::FirstName => &mut row.first_name,
    Column::Company => &mut row.company,
    Column::Status => &mut row.status,
    Column::StatusMessage => &mut row.status_message,
    Column::SentAt => &mut row.sent_at,
    Column::Response => &mut row.response,
    Column::Subject => &mut row.subject,
    Column::Body => &mut row.body,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const HEADER: &str =
    "Sender Email,Receiver Email,First Name,Company,Status,StatusMessage,SentAt,Responds,Subject,Body";

  #[test]
  fn reads_rows_in_file_order() {
    let csv = format!(
      "{HEADER}\n\
       a@x.com,one@y.com,Ann,Acme,SENT,,2024-01-01 10:00:00,,Hi,Body one\n\
       a@x.com,two@y.com,Bob,Beta,SENT,ok,2024-01-01 10:05:00,Sounds good,Hi,\"Body, two\"\n"
    );
    let rows = read_bytes(csv.as_bytes()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].receiver, "one@y.com");
    assert_eq!(rows[1].response, "Sounds good");
    assert_eq!(rows[1].body, "Body, two");
    assert_eq!(rows[1].status_message, "ok");
  }

  #[test]
  fn columns_may_be_reordered_and_padded() {
    let csv = "  Receiver   Email ,\u{feff}Sender Email,SentAt,Body,Subject,Responds,StatusMessage,Status,Company,First Name,Notes\n\
               one@y.com,a@x.com,2024-01-01 10:00,b,s,r,m,SENT,Acme,Ann,ignored\n";
    let rows = read_bytes(csv.as_bytes()).unwrap();
    assert_eq!(rows[0].sender, "a@x.com");
    assert_eq!(rows[0].receiver, "one@y.com");
    assert_eq!(rows[0].first_name, "Ann");
    assert_eq!(rows[0].sent_at, "2024-01-01 10:00");
  }

  #[test]
  fn missing_headers_are_reported() {
    let csv = "Sender Email,Receiver,SentAt,Notes\n";
    let err = read_bytes(csv.as_bytes()).unwrap_err();
    let Error::MissingHeaders(report) = err else {
      panic!("expected MissingHeaders, got {err:?}");
    };
    assert!(report.missing.contains(&"Receiver Email".to_owned()));
    assert!(report.missing.contains(&"Responds".to_owned()));
    assert!(!report.missing.contains(&"Sender Email".to_owned()));
    assert_eq!(report.extra, vec!["Receiver".to_owned(), "Notes".to_owned()]);
    assert_eq!(report.expected.len(), EXPECTED_HEADERS.len());
  }

  #[test]
  fn blank_lines_are_dropped_and_short_rows_padded() {
    let csv = format!("{HEADER}\n,,,,,,,,,\na@x.com,one@y.com\n");
    let rows = read_bytes(csv.as_bytes()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].sender, "a@x.com");
    assert_eq!(rows[0].sent_at, "");
  }

  #[test]
  fn empty_file_is_rejected() {
    assert!(matches!(read_bytes(b""), Err(Error::Empty)));
  }

  #[test]
  fn header_normalisation_collapses_whitespace() {
    assert_eq!(normalize_header("  First \t  Name "), "First Name");
  }
}
