//! Query-string helpers shared by the list endpoints.
//!
//! Parameters arrive as raw strings so that a bad value produces the standard
//! error envelope instead of the framework's plain-text rejection. Empty
//! values are treated as absent.

use std::{fmt::Display, str::FromStr};

use chrono::NaiveDate;
use mailtrack_core::store::{Page, Pagination};
use serde::Serialize;
use serde_json::json;

use crate::ApiError;

/// Trim `raw`, mapping empty to `None`.
pub fn present(raw: &Option<String>) -> Option<&str> {
  raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an optional parameter with `parse`, naming it in the error.
pub fn parse_with<T, E: Display>(
  name: &str,
  raw: &Option<String>,
  parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<Option<T>, ApiError> {
  present(raw)
    .map(|s| {
      parse(s).map_err(|e| {
        ApiError::bad_request_with(
          format!("invalid `{name}`: {e}"),
          json!({ "parameter": name, "value": s }),
        )
      })
    })
    .transpose()
}

pub fn parse_opt<T>(name: &str, raw: &Option<String>) -> Result<Option<T>, ApiError>
where
  T: FromStr,
  T::Err: Display,
{
  parse_with(name, raw, str::parse::<T>)
}

/// `YYYY-MM-DD`.
pub fn parse_date(name: &str, raw: &Option<String>) -> Result<Option<NaiveDate>, ApiError> {
  parse_with(name, raw, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
}

pub fn pagination(page: &Option<String>, per_page: &Option<String>) -> Result<Pagination, ApiError> {
  let page = parse_opt::<u32>("page", page)?;
  let per_page = parse_opt::<u32>("per_page", per_page)?;
  Ok(Pagination::new(page, per_page)?)
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
  pub page:          u32,
  pub per_page:      u32,
  pub total_records: u64,
  pub total_pages:   u64,
}

/// Split a page into its items and the pager block.
pub fn split_page<T>(page: Page<T>) -> (Vec<T>, PageInfo) {
  let info = PageInfo {
    page:          page.page,
    per_page:      page.per_page,
    total_records: page.total_records,
    total_pages:   page.total_pages,
  };
  (page.items, info)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_values_are_absent() {
    assert_eq!(parse_opt::<u32>("page", &Some("  ".into())).unwrap(), None);
    assert_eq!(parse_opt::<u32>("page", &None).unwrap(), None);
    assert_eq!(parse_opt::<u32>("page", &Some(" 4 ".into())).unwrap(), Some(4));
  }

  #[test]
  fn bad_values_name_the_parameter() {
    let err = parse_date("date_from", &Some("03/01/2024".into())).unwrap_err();
    assert!(err.to_string().contains("date_from"));
    assert!(pagination(&Some("0".into()), &None).is_err());
    assert!(pagination(&Some("-1".into()), &None).is_err());
  }
}
