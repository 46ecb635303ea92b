//! Structured filter criteria and the boolean expression tree evaluated
//! against record payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operators usable in an [`Expr::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    IsNull,
    IsNotNull,
    Contains,
    StartsWith,
    EndsWith,
    In,
}

/// Boolean expression over a JSON payload.
///
/// `path` is a dot-separated path into the payload; numeric segments index
/// into arrays (`"address.lines.0"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Compare {
        path: String,
        op: Operator,
        #[serde(default)]
        value: Value,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
}

impl Expr {
    pub fn compare(path: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, Operator::Equals, value)
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, Operator::GreaterThan, value)
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, Operator::LessThan, value)
    }

    pub fn and(self, other: Expr) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not {
            expr: Box::new(self),
        }
    }

    /// Evaluate against a record payload. A missing payload behaves like an
    /// empty object.
    pub fn evaluate(&self, data: Option<&Value>) -> bool {
        match self {
            Self::Compare { path, op, value } => {
                let resolved = data.and_then(|d| resolve_path(d, path));
                compare(resolved, *op, value)
            }
            Self::And { left, right } => left.evaluate(data) && right.evaluate(data),
            Self::Or { left, right } => left.evaluate(data) || right.evaluate(data),
            Self::Not { expr } => !expr.evaluate(data),
        }
    }
}

fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn order_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(resolved: Option<&Value>, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::IsNull => matches!(resolved, None | Some(Value::Null)),
        Operator::IsNotNull => !matches!(resolved, None | Some(Value::Null)),
        Operator::Equals => resolved.is_some_and(|v| values_equal(v, expected)),
        Operator::NotEquals => !resolved.is_some_and(|v| values_equal(v, expected)),
        Operator::GreaterThan => {
            resolved.and_then(|v| order_values(v, expected)) == Some(Ordering::Greater)
        }
        Operator::GreaterThanOrEqualTo => matches!(
            resolved.and_then(|v| order_values(v, expected)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::LessThan => {
            resolved.and_then(|v| order_values(v, expected)) == Some(Ordering::Less)
        }
        Operator::LessThanOrEqualTo => matches!(
            resolved.and_then(|v| order_values(v, expected)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Contains => match (resolved, expected) {
            (Some(Value::String(s)), Value::String(needle)) => s.contains(needle.as_str()),
            (Some(Value::Array(items)), needle) => items.iter().any(|i| values_equal(i, needle)),
            _ => false,
        },
        Operator::StartsWith => match (resolved, expected) {
            (Some(Value::String(s)), Value::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (resolved, expected) {
            (Some(Value::String(s)), Value::String(suffix)) => s.ends_with(suffix.as_str()),
            _ => false,
        },
        Operator::In => match (resolved, expected) {
            (Some(v), Value::Array(options)) => options.iter().any(|o| values_equal(v, o)),
            _ => false,
        },
    }
}

/// Structured filter criteria accepted by every read and enumeration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Exact name match (case-insensitive)
    pub name: Option<String>,
    /// All labels must be present (case-insensitive)
    #[serde(default)]
    pub labels: Vec<String>,
    /// All key/value pairs must be present; keys compare case-insensitively
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub expression: Option<Expr>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_expression(mut self, expr: Expr) -> Self {
        self.expression = Some(expr);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.labels.is_empty()
            && self.tags.is_empty()
            && self.expression.is_none()
    }

    /// Whether `labels` contains every required label.
    pub fn labels_match<'a>(&self, labels: impl IntoIterator<Item = &'a str> + Clone) -> bool {
        self.labels.iter().all(|required| {
            labels
                .clone()
                .into_iter()
                .any(|l| l.eq_ignore_ascii_case(required))
        })
    }

    /// Whether `tags` contains every required key/value pair.
    pub fn tags_match<'a>(
        &self,
        tags: impl IntoIterator<Item = (&'a str, &'a str)> + Clone,
    ) -> bool {
        self.tags.iter().all(|(key, value)| {
            tags.clone()
                .into_iter()
                .any(|(k, v)| k.eq_ignore_ascii_case(key) && v == value)
        })
    }

    pub fn name_matches(&self, name: Option<&str>) -> bool {
        match (&self.name, name) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }

    pub fn expression_matches(&self, data: Option<&Value>) -> bool {
        self.expression.as_ref().is_none_or(|e| e.evaluate(data))
    }
}
