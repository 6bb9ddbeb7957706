//! Filter, sort, paginate, and join evaluation over a table's rows.
//!
//! The filter grammar is a small boolean tree of conditions. `like` and
//! `contains` compile their right-hand side as a [`regex::Regex`] rather
//! than hand-rolling glob matching — the same choice the corpus makes
//! elsewhere for pattern matching in a database context.

#[cfg(test)]
mod tests;

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use thiserror::Error;

use crate::index::Index;
use crate::model::{index_key, Record};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error("invalid regular expression in {operator} condition: {source}")]
    InvalidPattern {
        operator: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("`in` operator requires an array value")]
    InNotArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
    Contains,
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub operator: CmpOp,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub enum Filter {
    Condition(Condition),
    Group { op: BoolOp, conditions: Vec<Filter> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Evaluates `filter` against `row`. A condition over a missing column is
/// always false (no three-valued logic).
pub fn matches(filter: &Filter, row: &Record) -> Result<bool, QueryError> {
    match filter {
        Filter::Condition(c) => matches_condition(c, row),
        Filter::Group { op, conditions } => match op {
            BoolOp::And => {
                for f in conditions {
                    if !matches(f, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BoolOp::Or => {
                for f in conditions {
                    if matches(f, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },
    }
}

fn matches_condition(c: &Condition, row: &Record) -> Result<bool, QueryError> {
    let Some(actual) = row.get(&c.column) else {
        return Ok(false);
    };

    match c.operator {
        CmpOp::Eq => Ok(actual == &c.value),
        CmpOp::Ne => Ok(actual != &c.value),
        CmpOp::Gt => Ok(compare_numeric_or_string(actual, &c.value) == Some(std::cmp::Ordering::Greater)),
        CmpOp::Gte => Ok(matches!(
            compare_numeric_or_string(actual, &c.value),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),
        CmpOp::Lt => Ok(compare_numeric_or_string(actual, &c.value) == Some(std::cmp::Ordering::Less)),
        CmpOp::Lte => Ok(matches!(
            compare_numeric_or_string(actual, &c.value),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        CmpOp::In => {
            let Value::Array(items) = &c.value else {
                return Err(QueryError::InNotArray);
            };
            Ok(items.contains(actual))
        }
        CmpOp::Like => {
            let pattern = c.value.as_str().unwrap_or_default();
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| QueryError::InvalidPattern {
                    operator: "like",
                    source,
                })?;
            Ok(actual.as_str().map(|s| re.is_match(s)).unwrap_or(false))
        }
        CmpOp::Contains => {
            let pattern = c.value.as_str().unwrap_or_default();
            let re = Regex::new(pattern).map_err(|source| QueryError::InvalidPattern {
                operator: "contains",
                source,
            })?;
            Ok(actual.as_str().map(|s| re.is_match(s)).unwrap_or(false))
        }
    }
}

fn compare_numeric_or_string(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Stable sort by a single column; rows with a missing column sort last.
pub fn sort(rows: &mut [Record], spec: &Sort) {
    rows.sort_by(|a, b| {
        let ordering = match (a.get(&spec.column), b.get(&spec.column)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    compare_numeric_or_string(a, b).unwrap_or(std::cmp::Ordering::Equal)
}

/// Applies offset-then-limit pagination. Must run after sorting.
pub fn paginate(rows: Vec<Record>, page: &Page) -> Vec<Record> {
    let skipped: Vec<_> = rows.into_iter().skip(page.offset).collect();
    match page.limit {
        Some(limit) => skipped.into_iter().take(limit).collect(),
        None => skipped,
    }
}

/// Merges a joined row's fields into `base`, with the joined row's fields
/// taking precedence on conflict.
pub fn join_merge(base: &Record, joined: &Record) -> Record {
    let mut merged = base.clone();
    for (k, v) in joined {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

/// Attempts to resolve the id set for an equality condition using one of
/// `candidates`, returning the first index (in caller-provided order) whose
/// columns are covered by the condition.
pub fn index_assisted_ids<'a>(
    condition: &Condition,
    candidates: &[&'a Index],
) -> Option<(&'a Index, Vec<String>)> {
    if condition.operator != CmpOp::Eq {
        return None;
    }
    for index in candidates {
        if index.columns() == [condition.column.clone()] {
            let mut single_row = Record::new();
            single_row.insert(condition.column.clone(), condition.value.clone());
            let key = index_key(&single_row, index.columns());
            return Some((index, index.lookup(&key).to_vec()));
        }
    }
    None
}
