//! Channel descriptions and change payloads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which change kinds a table watch receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl ChangeFilter {
    /// Value of the `event` field in the join config.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Only(kind) => kind.as_str(),
        }
    }
}

/// Comparison operators accepted by the change stream's row filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            other => Err(FilterError::Operator(other.to_string())),
        }
    }
}

/// A row filter such as `status=eq.pending` or `id=in.(1,2,3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowFilter {
    column: String,
    op: FilterOp,
    value: String,
}

impl RowFilter {
    /// Parse `column=op.value`.
    ///
    /// # Errors
    ///
    /// Returns a [`FilterError`] for malformed input, a non-identifier
    /// column, an unsupported operator or an empty value.
    pub fn parse(expr: &str) -> Result<Self, FilterError> {
        let (column, rest) = expr
            .split_once('=')
            .ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| FilterError::Malformed(expr.to_string()))?;

        let column = column.trim();
        if column.is_empty()
            || !column
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(FilterError::Column(column.to_string()));
        }
        let op = op.trim().parse::<FilterOp>()?;
        if value.is_empty() {
            return Err(FilterError::EmptyValue);
        }

        Ok(Self {
            column: column.to_string(),
            op,
            value: value.to_string(),
        })
    }

    /// Shorthand for `column=eq.value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: value.to_string(),
        }
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.column, self.op.as_str(), self.value)
    }
}

impl FromStr for RowFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One table to watch on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableWatch {
    pub schema: String,
    pub table: String,
    pub event: ChangeFilter,
    pub filter: Option<RowFilter>,
}

impl TableWatch {
    /// Watch every change to `public.<table>`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            event: ChangeFilter::All,
            filter: None,
        }
    }

    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Only receive one kind of change.
    #[must_use]
    pub const fn on(mut self, kind: ChangeKind) -> Self {
        self.event = ChangeFilter::Only(kind);
        self
    }

    /// Only receive changes to rows matching `filter`.
    #[must_use]
    pub fn filtered(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Everything a transport needs to open a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub tables: Vec<TableWatch>,
}

impl ChannelSpec {
    /// Phoenix topic for the channel.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.name)
    }
}

/// A single row change delivered by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub schema: String,
    pub table: String,
    #[serde(rename = "type", alias = "eventType")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl ChangePayload {
    /// The `id` of the affected row (from the new record, or the old record
    /// for deletes).
    #[must_use]
    pub fn row_id(&self) -> Option<&str> {
        self.record
            .get("id")
            .or_else(|| self.old_record.get("id"))
            .and_then(serde_json::Value::as_str)
    }
}
