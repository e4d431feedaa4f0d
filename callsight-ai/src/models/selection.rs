//! Work selection options

use callsight_common::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Call log columns a reanalysis filter may reference
///
/// Filters never interpolate caller text into SQL: only these names are
/// emitted, values are always bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLogColumn {
    RecordingId,
    DocumentId,
    Transcript,
    Summary,
    Coaching,
    Tags,
    Sentiment,
    ResolutionStatus,
    Escalated,
    CallType,
    AgentName,
    CustomerName,
    CustomerPhone,
    OperatorNotes,
    Disposition,
    AnalyzedAt,
}

impl CallLogColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CallLogColumn::RecordingId => "recording_id",
            CallLogColumn::DocumentId => "document_id",
            CallLogColumn::Transcript => "transcript",
            CallLogColumn::Summary => "summary",
            CallLogColumn::Coaching => "coaching",
            CallLogColumn::Tags => "tags",
            CallLogColumn::Sentiment => "sentiment",
            CallLogColumn::ResolutionStatus => "resolution_status",
            CallLogColumn::Escalated => "escalated",
            CallLogColumn::CallType => "call_type",
            CallLogColumn::AgentName => "agent_name",
            CallLogColumn::CustomerName => "customer_name",
            CallLogColumn::CustomerPhone => "customer_phone",
            CallLogColumn::OperatorNotes => "operator_notes",
            CallLogColumn::Disposition => "disposition",
            CallLogColumn::AnalyzedAt => "analyzed_at",
        }
    }

    /// Columns stored as INTEGER; filter values are bound as integers
    pub fn is_integer(&self) -> bool {
        matches!(self, CallLogColumn::Sentiment | CallLogColumn::Escalated)
    }
}

impl FromStr for CallLogColumn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let column = match s.trim().to_ascii_lowercase().as_str() {
            "recording_id" => CallLogColumn::RecordingId,
            "document_id" => CallLogColumn::DocumentId,
            "transcript" => CallLogColumn::Transcript,
            "summary" => CallLogColumn::Summary,
            "coaching" => CallLogColumn::Coaching,
            "tags" | "tags_array" => CallLogColumn::Tags,
            "sentiment" => CallLogColumn::Sentiment,
            "resolution_status" => CallLogColumn::ResolutionStatus,
            "escalated" => CallLogColumn::Escalated,
            "call_type" => CallLogColumn::CallType,
            "agent_name" => CallLogColumn::AgentName,
            "customer_name" => CallLogColumn::CustomerName,
            "customer_phone" => CallLogColumn::CustomerPhone,
            "operator_notes" => CallLogColumn::OperatorNotes,
            "disposition" => CallLogColumn::Disposition,
            "analyzed_at" => CallLogColumn::AnalyzedAt,
            other => return Err(Error::InvalidInput(format!("unknown call log column: {}", other))),
        };
        Ok(column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    IsNull,
    NotNull,
    /// Tag list contains the value
    Contains,
    /// Tag list shares at least one of the comma-separated values
    Overlaps,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::NotEq => "neq",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Like => "like",
            FilterOp::IsNull => "is_null",
            FilterOp::NotNull => "not_null",
            FilterOp::Contains => "contains",
            FilterOp::Overlaps => "overlaps",
        }
    }

    /// Operators that take no value
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOp::IsNull | FilterOp::NotNull)
    }

    /// Operators that only apply to the tag list
    pub fn is_tag_op(&self) -> bool {
        matches!(self, FilterOp::Contains | FilterOp::Overlaps)
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" => FilterOp::Eq,
            "neq" | "ne" | "!=" => FilterOp::NotEq,
            "lt" | "<" => FilterOp::Lt,
            "lte" | "<=" => FilterOp::Lte,
            "gt" | ">" => FilterOp::Gt,
            "gte" | ">=" => FilterOp::Gte,
            "like" => FilterOp::Like,
            "is_null" | "null" => FilterOp::IsNull,
            "not_null" => FilterOp::NotNull,
            "contains" | "cs" => FilterOp::Contains,
            "overlaps" | "ov" => FilterOp::Overlaps,
            other => return Err(Error::InvalidInput(format!("unknown filter operator: {}", other))),
        };
        Ok(op)
    }
}

/// Caller-supplied `column op value` predicate over the call log table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub column: CallLogColumn,
    pub op: FilterOp,
    pub value: Option<String>,
}

impl FieldFilter {
    pub fn new(column: CallLogColumn, op: FilterOp, value: Option<String>) -> Result<Self> {
        let filter = Self { column, op, value };
        filter.validate()?;
        Ok(filter)
    }

    fn validate(&self) -> Result<()> {
        if self.op.is_tag_op() && self.column != CallLogColumn::Tags {
            return Err(Error::InvalidInput(format!(
                "operator {:?} only applies to tags, not {}",
                self.op,
                self.column.as_sql()
            )));
        }
        if !self.op.is_unary() && self.value.is_none() {
            return Err(Error::InvalidInput(format!("operator {:?} requires a value", self.op)));
        }
        if self.column.is_integer() && !self.op.is_unary() {
            let value = self.value.as_deref().unwrap_or_default();
            if integer_filter_value(value).is_none() {
                return Err(Error::InvalidInput(format!(
                    "{} expects an integer value, got {:?}",
                    self.column.as_sql(),
                    value
                )));
            }
        }
        Ok(())
    }

    /// Values for [`FilterOp::Overlaps`], split on commas
    pub fn overlap_values(&self) -> Vec<String> {
        self.value
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Integer form of a filter value; booleans map to 0/1
pub fn integer_filter_value(value: &str) -> Option<i64> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(1),
        "false" | "no" => Some(0),
        other => other.parse().ok(),
    }
}

/// Canonical `column:op[:value]`, with aliases resolved
impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.column.as_sql(), self.op.as_str())?;
        if let Some(value) = &self.value {
            write!(f, ":{}", value)?;
        }
        Ok(())
    }
}

/// Parses `column:op[:value]`; the value may itself contain colons
impl FromStr for FieldFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let column = parts
            .next()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput(format!("filter {:?} is missing a column", s)))?
            .parse()?;
        let op = parts
            .next()
            .ok_or_else(|| Error::InvalidInput(format!("filter {:?} is missing an operator", s)))?
            .parse()?;
        let value = parts.next().map(str::to_string);
        FieldFilter::new(column, op, value)
    }
}

/// Predicate for reanalysis selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReanalysisFilter {
    /// Rows whose tag list is missing or empty
    EmptyTags,
    Field(FieldFilter),
}

/// Which records are candidates for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    /// Ingested documents with no completion marker and no stored analysis
    Normal,
    /// Stored call log rows matching a filter
    Reanalysis(ReanalysisFilter),
}

impl SelectionMode {
    pub fn label(&self) -> &'static str {
        match self {
            SelectionMode::Normal => "normal",
            SelectionMode::Reanalysis(_) => "reanalysis",
        }
    }

    /// Identifies the selected record set; runs resume only within the same key
    pub fn selection_key(&self) -> String {
        match self {
            SelectionMode::Normal => "normal".to_string(),
            SelectionMode::Reanalysis(ReanalysisFilter::EmptyTags) => "reanalysis:empty_tags".to_string(),
            SelectionMode::Reanalysis(ReanalysisFilter::Field(filter)) => format!("reanalysis:{}", filter),
        }
    }
}

/// Full selection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionQuery {
    pub mode: SelectionMode,
    /// Maximum number of records to yield; None drains everything
    pub limit: Option<usize>,
    /// Number of eligible records to skip before yielding
    pub offset: usize,
    /// Resume point: only records whose key sorts after this one are considered
    pub after_key: Option<String>,
}

impl SelectionQuery {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            limit: None,
            offset: 0,
            after_key: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn after(mut self, key: impl Into<String>) -> Self {
        self.after_key = Some(key.into());
        self
    }
}
