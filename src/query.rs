//! List query parameters, sort specs and pagination metadata.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Caller-supplied list parameters. Call [`QueryParams::normalized`] before use.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub search: Option<String>,
    /// Column to value equality filters.
    pub filter: BTreeMap<String, Value>,
    pub sort: Option<String>,
    pub page: i64,
    pub page_size: i64,
    /// Comma-separated projection.
    pub fields: Option<String>,
    /// Comma-separated relation names.
    pub include: Option<String>,
}

impl QueryParams {
    /// page <= 0 becomes 1, page_size <= 0 becomes 10, page_size > 100 becomes 100.
    pub fn normalized(mut self) -> Self {
        if self.page <= 0 {
            self.page = DEFAULT_PAGE;
        }
        if self.page_size <= 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        } else if self.page_size > MAX_PAGE_SIZE {
            self.page_size = MAX_PAGE_SIZE;
        }
        self
    }

    /// Rows to skip. Saturates, so a huge page yields an empty result instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.page_size.max(0))
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn field_list(&self) -> Vec<String> {
        split_list(self.fields.as_deref())
    }

    pub fn include_list(&self) -> Vec<String> {
        split_list(self.include.as_deref())
    }

    /// Build from raw query-string pairs. Recognized keys: `search`, `sort`, `page`,
    /// `page_size` (or `pageSize`), `fields`, `include`, and `filter[<column>]`.
    /// Other keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = QueryParams::default();
        for (key, value) in pairs {
            let key = key.as_ref();
            let value: String = value.into();
            match key {
                "search" | "q" => params.search = Some(value),
                "sort" => params.sort = Some(value),
                "page" => params.page = parse_number(key, &value)?,
                "page_size" | "pageSize" => params.page_size = parse_number(key, &value)?,
                "fields" => params.fields = Some(value),
                "include" => params.include = Some(value),
                _ => {
                    if let Some(column) = key.strip_prefix("filter[").and_then(|k| k.strip_suffix(']')) {
                        if column.is_empty() {
                            return Err(AppError::BadRequest("empty filter key".into()));
                        }
                        params.filter.insert(column.to_string(), Value::String(value));
                    }
                }
            }
        }
        Ok(params)
    }
}

fn parse_number(key: &str, value: &str) -> Result<i64, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be an integer, got '{}'", key, value)))
}

fn split_list(s: Option<&str>) -> Vec<String> {
    s.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

/// Parsed `ORDER BY` list. Accepts `name,-age` and `name desc, age asc`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let mut keys = Vec::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut words = part.split_whitespace();
            let first = words.next().unwrap_or_default();
            let (column, mut descending) = match first.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (first.strip_prefix('+').unwrap_or(first), false),
            };
            if let Some(dir) = words.next() {
                descending = match dir.to_ascii_lowercase().as_str() {
                    "asc" => false,
                    "desc" => true,
                    other => return Err(AppError::BadRequest(format!("invalid sort direction '{}'", other))),
                };
            }
            if words.next().is_some() || column.is_empty() {
                return Err(AppError::BadRequest(format!("invalid sort clause '{}'", part)));
            }
            keys.push(SortKey {
                column: column.to_string(),
                descending,
            });
        }
        Ok(SortSpec { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Pagination summary returned alongside a page of rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub pages: i64,
}

impl Meta {
    pub fn new(page: i64, page_size: i64, total: i64) -> Self {
        let pages = if total <= 0 || page_size <= 0 {
            0
        } else {
            (total + page_size - 1) / page_size
        };
        Meta {
            page,
            page_size,
            total,
            pages,
        }
    }
}
