//! Payload decoder: raw text → 2-D grid of scalar cells.
//!
//! The accepted shape is a JSON array of arrays whose elements are strings,
//! numbers, booleans or `null`. Rows may be jagged. Anything else is
//! [`DecodeError::Malformed`]; blank input and a bare `null` are
//! [`DecodeError::Empty`].

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Opaque text as fetched from the backing store.
pub type RawPayload = String;

/// Decoded rows, in source order.
pub type Rows = Vec<Vec<Cell>>;

/// Why a payload could not be turned into rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Blank input or a bare `null`.
    #[error("payload is empty")]
    Empty,
    /// Syntax error or a shape other than an array of arrays of scalars.
    #[error("payload is malformed: {details}")]
    Malformed { details: String },
}

/// One scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Cell {
    /// True for `null` and the empty string.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Textual form used for free-text columns.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Empty => Cow::Borrowed(""),
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Number(n) => Cow::Owned(n.to_string()),
            Self::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

/// Decode a raw payload into rows of cells. Pure.
pub fn decode(raw: &str) -> Result<Rows, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value = serde_json::from_str(raw).map_err(|e| DecodeError::Malformed {
        details: e.to_string(),
    })?;

    let rows = match value {
        Value::Null => return Err(DecodeError::Empty),
        Value::Array(rows) => rows,
        other => {
            return Err(DecodeError::Malformed {
                details: format!("top level is {}, expected an array", kind_of(&other)),
            });
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(row_idx, row)| match row {
            Value::Array(cells) => cells
                .into_iter()
                .enumerate()
                .map(|(col_idx, cell)| to_cell(cell, row_idx, col_idx))
                .collect(),
            other => Err(DecodeError::Malformed {
                details: format!(
                    "row {} is {}, expected an array",
                    row_idx + 1,
                    kind_of(&other)
                ),
            }),
        })
        .collect()
}

fn to_cell(value: Value, row_idx: usize, col_idx: usize) -> Result<Cell, DecodeError> {
    match value {
        Value::Null => Ok(Cell::Empty),
        Value::String(s) => Ok(Cell::Text(s)),
        Value::Number(n) => Ok(Cell::Number(n)),
        Value::Bool(b) => Ok(Cell::Bool(b)),
        other => Err(DecodeError::Malformed {
            details: format!(
                "row {}, column {} holds {}, expected a scalar",
                row_idx + 1,
                col_idx + 1,
                kind_of(&other)
            ),
        }),
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
