use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Row;

/// Row filter understood by every data service.
///
/// Mirrors the hosted REST backend's operators: equality, set membership,
/// inclusive range bounds, case-insensitive substring and OR over other
/// filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    /// Case-insensitive substring match on a text column
    Contains(String, String),
    /// Matches when any inner filter matches
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(column.to_string(), value.into())
    }

    pub fn lte(column: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(column.to_string(), value.into())
    }

    pub fn contains(column: &str, needle: impl Into<String>) -> Self {
        Filter::Contains(column.to_string(), needle.into())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Evaluate against a row. Missing columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let cmp = |column: &str, value: &Value| {
            row.get(column).and_then(|v| compare_values(v, value))
        };

        match self {
            Filter::Eq(column, value) => cmp(column, value) == Some(Ordering::Equal),
            Filter::In(column, values) => values
                .iter()
                .any(|value| cmp(column, value) == Some(Ordering::Equal)),
            Filter::Gte(column, value) => matches!(
                cmp(column, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Filter::Lte(column, value) => matches!(
                cmp(column, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Filter::Contains(column, needle) => row
                .get(column)
                .and_then(Value::as_str)
                .is_some_and(|text| text.to_lowercase().contains(&needle.to_lowercase())),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }

    /// Encode as a REST query parameter, e.g. `("gonderen_id", "eq.abc")`
    /// or `("or", "(a.eq.1,b.eq.2)")`.
    pub fn to_query_pair(&self) -> (String, String) {
        match self {
            Filter::Or(filters) => ("or".to_string(), format!("({})", join_inline(filters))),
            Filter::Eq(column, _)
            | Filter::In(column, _)
            | Filter::Gte(column, _)
            | Filter::Lte(column, _)
            | Filter::Contains(column, _) => (column.clone(), self.operand(false)),
        }
    }

    /// Encoding used inside an `or=(...)` list
    fn to_inline(&self) -> String {
        match self {
            Filter::Or(filters) => format!("or({})", join_inline(filters)),
            Filter::Eq(column, _)
            | Filter::In(column, _)
            | Filter::Gte(column, _)
            | Filter::Lte(column, _)
            | Filter::Contains(column, _) => format!("{}.{}", column, self.operand(true)),
        }
    }

    /// `op.value` part of a column filter
    fn operand(&self, in_list: bool) -> String {
        match self {
            Filter::Eq(_, value) => format!("eq.{}", encode_value(value, in_list)),
            Filter::In(_, values) => {
                let items: Vec<String> = values.iter().map(|v| encode_value(v, true)).collect();
                format!("in.({})", items.join(","))
            }
            Filter::Gte(_, value) => format!("gte.{}", encode_value(value, in_list)),
            Filter::Lte(_, value) => format!("lte.{}", encode_value(value, in_list)),
            Filter::Contains(_, needle) => {
                let pattern = Value::String(format!("*{}*", needle));
                format!("ilike.{}", encode_value(&pattern, in_list))
            }
            Filter::Or(filters) => format!("or({})", join_inline(filters)),
        }
    }
}

fn join_inline(filters: &[Filter]) -> String {
    filters
        .iter()
        .map(Filter::to_inline)
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a value for the REST filter grammar. Inside `or=(...)`, strings
/// holding reserved characters must be double-quoted.
fn encode_value(value: &Value, in_list: bool) -> String {
    match value {
        Value::String(s) => {
            if in_list && s.contains([',', '.', ':', '(', ')']) {
                format!("\"{}\"", s)
            } else {
                s.clone()
            }
        }
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Compare two JSON scalars. RFC 3339 strings compare as instants.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.as_str().cmp(y.as_str())),
        },
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Sort direction for a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }

    pub fn to_query_value(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        format!("{}.{}", self.column, direction)
    }

    /// Stable in-place sort; rows missing the column sort first.
    pub(crate) fn sort(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| {
            let ordering = match (a.get(&self.column), b.get(&self.column)) {
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if self.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }
}

/// Related table pulled into each row, keyed by the foreign key `local_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub table: String,
    pub local_key: String,
    pub columns: Vec<String>,
    /// Drop rows without a related row (inner join)
    pub inner: bool,
}

impl Embed {
    pub fn inner(table: &str, local_key: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            local_key: local_key.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            inner: true,
        }
    }
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub embed: Option<Embed>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            embed: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// REST `select` clause, e.g. `*,arabalar!inner(baslik)`
    pub fn select_clause(&self) -> String {
        match &self.embed {
            None => "*".to_string(),
            Some(embed) => format!(
                "*,{}{}({})",
                embed.table,
                if embed.inner { "!inner" } else { "" },
                embed.columns.join(",")
            ),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}
