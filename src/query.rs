//! Filter expressions and query parameters for tabular endpoints.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::constants::query::{PARAM_LIMIT, PARAM_WHERE, PREDICATE_JOINER};
use crate::date_helpers::format_timestamp;
use crate::tasks::FetchTask;
use crate::types::{Endpoint, FieldName, FilterExpr};

/// One condition of a filter expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Text equality: `field = 'value'`.
    Eq(FieldName, String),
    /// Numeric threshold: `field > value`.
    Gt(FieldName, f64),
    /// Numeric threshold: `field >= value`.
    Gte(FieldName, f64),
    /// Numeric threshold: `field < value`.
    Lt(FieldName, f64),
    /// Half-open timestamp window: `field >= 'start' AND field < 'end'`.
    Window(FieldName, NaiveDateTime, NaiveDateTime),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(field, value) => write!(f, "{field} = '{}'", escape_literal(value)),
            Predicate::Gt(field, value) => write!(f, "{field} > {value}"),
            Predicate::Gte(field, value) => write!(f, "{field} >= {value}"),
            Predicate::Lt(field, value) => write!(f, "{field} < {value}"),
            Predicate::Window(field, start, end) => write!(
                f,
                "{field} >= '{}'{PREDICATE_JOINER}{field} < '{}'",
                format_timestamp(start),
                format_timestamp(end)
            ),
        }
    }
}

/// Double single quotes so a value can sit inside a quoted literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Conjunction of predicates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Filter with no predicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a predicate.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Append every predicate from `predicates`.
    pub fn and_all<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        self.predicates.extend(predicates);
        self
    }

    /// Returns `true` when no predicate has been added.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Predicates in insertion order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Render the expression, joining predicates with ` AND `.
    pub fn render(&self) -> FilterExpr {
        self.predicates
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(PREDICATE_JOINER)
    }
}

/// Ordered query parameter set.
///
/// Iteration order is sorted by parameter name, which also makes it usable as
/// a cache key component.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParams {
    params: BTreeMap<String, String>,
}

impl QueryParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Value of `name`, if set.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parameters sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` when no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Sorted `(name, value)` pairs.
    pub fn sorted_items(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Everything needed to turn a [`FetchTask`] into one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskQuery {
    /// Endpoint every task is sent to.
    pub endpoint: Endpoint,
    /// Field compared for equality against the task entity.
    pub entity_field: FieldName,
    /// Field bounded by the task window.
    pub timestamp_field: FieldName,
    /// Extra predicates placed between the entity and window conditions.
    pub extra: Vec<Predicate>,
    /// Row ceiling sent with each request.
    pub row_limit: usize,
}

impl TaskQuery {
    /// Filter for one task: entity equality, extra predicates, then the window.
    pub fn filter_for(&self, task: &FetchTask) -> Filter {
        Filter::new()
            .and(Predicate::Eq(
                self.entity_field.clone(),
                task.entity_id.clone(),
            ))
            .and_all(self.extra.iter().cloned())
            .and(Predicate::Window(
                self.timestamp_field.clone(),
                task.window_start,
                task.window_end,
            ))
    }

    /// Query parameters for one task.
    pub fn params_for(&self, task: &FetchTask) -> QueryParams {
        QueryParams::new()
            .with(PARAM_WHERE, self.filter_for(task).render())
            .with(PARAM_LIMIT, self.row_limit.to_string())
    }
}
