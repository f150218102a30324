// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Row-store query description, rendered as PostgREST query parameters.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};

/// A row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = value`
    Eq(String, String),
    /// Array column contains all `values`
    Contains(String, Vec<String>),
}

/// Select/update/delete target on one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    filters: Vec<Filter>,
    order: Option<(String, bool)>,
    range: Option<(u64, u64)>,
    count: bool,
}

impl Query {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
            count: false,
        }
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters
            .push(Filter::Eq(column.to_string(), value.to_string()));
        self
    }

    pub fn contains(mut self, column: &str, values: &[&str]) -> Self {
        self.filters.push(Filter::Contains(
            column.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    /// Inclusive row range `from..=to`.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to.max(from)));
        self
    }

    /// Ask for the exact number of matching rows.
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn wants_count(&self) -> bool {
        self.count
    }

    /// Filter parameters only (used for updates and deletes).
    pub fn filter_params(&self) -> Vec<(String, String)> {
        self.filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value)),
                Filter::Contains(column, values) => {
                    let quoted: Vec<String> = values.iter().map(|v| quote_element(v)).collect();
                    (column.clone(), format!("cs.{{{}}}", quoted.join(",")))
                }
            })
            .collect()
    }

    /// All query parameters for a select.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(self.filter_params());

        if let Some((column, ascending)) = &self.order {
            let direction = if *ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", column, direction)));
        }

        if let Some((from, to)) = self.range {
            params.push(("offset".to_string(), from.to_string()));
            params.push(("limit".to_string(), (to - from + 1).to_string()));
        }

        params
    }
}

/// Quote one element of a PostgREST array literal.
fn quote_element(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Rows returned by a select, with the exact count when requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

impl Rows {
    /// Decode every row.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(decode_error))
            .collect()
    }

    /// Decode the first row, if any.
    pub fn first<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.rows.into_iter().next() {
            Some(row) => serde_json::from_value(row).map(Some).map_err(decode_error),
            None => Ok(None),
        }
    }
}

fn decode_error(e: serde_json::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Failed to decode row: {}", e))
}

/// Parse the total from a `Content-Range` header (`0-9/42`, `*/0`).
pub fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}
