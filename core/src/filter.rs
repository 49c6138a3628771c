//! Payload predicates and their evaluation.
//!
//! [`evaluate`] is total: a missing key or a value of the wrong type makes a
//! leaf false instead of raising. Shapes that cannot be given a sensible
//! meaning are rejected up front by [`validate`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::{Payload, PayloadValue};

const MAX_FILTER_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Match {
        key: String,
        value: PayloadValue,
    },
    Range {
        key: String,
        #[serde(flatten)]
        range: RangeBounds,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// Numeric bounds; unset bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
}

impl RangeBounds {
    fn contains(&self, value: f64) -> bool {
        if self.gt.is_some_and(|bound| value <= bound) {
            return false;
        }
        if self.gte.is_some_and(|bound| value < bound) {
            return false;
        }
        if self.lt.is_some_and(|bound| value >= bound) {
            return false;
        }
        if self.lte.is_some_and(|bound| value > bound) {
            return false;
        }
        true
    }

    fn is_unbounded(&self) -> bool {
        self.gt.is_none() && self.gte.is_none() && self.lt.is_none() && self.lte.is_none()
    }
}

impl Filter {
    pub fn matches(key: impl Into<String>, value: impl Into<PayloadValue>) -> Self {
        Self::Match {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Inclusive `min <= value <= max`; either side may be left open.
    pub fn range(key: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Self::Range {
            key: key.into(),
            range: RangeBounds {
                gte: min,
                lte: max,
                ..RangeBounds::default()
            },
        }
    }

    /// Every condition must hold.
    pub fn must(conditions: Vec<Filter>) -> Self {
        Self::And(conditions)
    }

    /// At least one condition must hold.
    pub fn should(conditions: Vec<Filter>) -> Self {
        Self::Or(conditions)
    }

    /// None of the conditions may hold.
    pub fn must_not(conditions: Vec<Filter>) -> Self {
        Self::Not(Box::new(Self::Or(conditions)))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Evaluates `filter` against `payload`.
pub fn evaluate(filter: &Filter, payload: &Payload) -> bool {
    match filter {
        Filter::Match { key, value } => payload
            .get(key)
            .is_some_and(|actual| value_matches(actual, value)),
        Filter::Range { key, range } => payload
            .get(key)
            .is_some_and(|actual| value_in_range(actual, range)),
        Filter::And(children) => children.iter().all(|child| evaluate(child, payload)),
        Filter::Or(children) => children.iter().any(|child| evaluate(child, payload)),
        Filter::Not(child) => !evaluate(child, payload),
    }
}

/// Rejects filters the evaluator cannot give a meaning to.
pub fn validate(filter: &Filter) -> Result<()> {
    validate_at_depth(filter, 1)
}

fn validate_at_depth(filter: &Filter, depth: usize) -> Result<()> {
    if depth > MAX_FILTER_DEPTH {
        return Err(Error::InvalidFilter(format!(
            "filter nesting exceeds {MAX_FILTER_DEPTH} levels"
        )));
    }

    match filter {
        Filter::Match { key, value } => {
            validate_key(key)?;
            if value.is_list() {
                return Err(Error::InvalidFilter(format!(
                    "match on '{key}' needs a scalar value"
                )));
            }
            if matches!(value, PayloadValue::Float(number) if !number.is_finite()) {
                return Err(Error::InvalidFilter(format!(
                    "match on '{key}' needs a finite number"
                )));
            }
            Ok(())
        }
        Filter::Range { key, range } => {
            validate_key(key)?;
            validate_range(key, range)
        }
        Filter::And(children) | Filter::Or(children) => children
            .iter()
            .try_for_each(|child| validate_at_depth(child, depth + 1)),
        Filter::Not(child) => validate_at_depth(child, depth + 1),
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidFilter(
            "filter keys must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_range(key: &str, range: &RangeBounds) -> Result<()> {
    if range.is_unbounded() {
        return Err(Error::InvalidFilter(format!(
            "range on '{key}' requires at least one bound"
        )));
    }
    let bounds = [range.gt, range.gte, range.lt, range.lte];
    if bounds.iter().flatten().any(|bound| !bound.is_finite()) {
        return Err(Error::InvalidFilter(format!(
            "range on '{key}' has a non-finite bound"
        )));
    }
    if let (Some(lower), Some(upper)) = (range.gte.or(range.gt), range.lte.or(range.lt)) {
        if lower > upper {
            return Err(Error::InvalidFilter(format!(
                "range on '{key}' has lower bound above upper bound"
            )));
        }
    }
    Ok(())
}

fn value_matches(actual: &PayloadValue, expected: &PayloadValue) -> bool {
    match actual {
        PayloadValue::List(values) => values.iter().any(|value| value.scalar_eq(expected)),
        scalar => scalar.scalar_eq(expected),
    }
}

fn value_in_range(actual: &PayloadValue, range: &RangeBounds) -> bool {
    match actual {
        PayloadValue::List(values) => values
            .iter()
            .filter_map(PayloadValue::as_f64)
            .any(|value| range.contains(value)),
        scalar => scalar.as_f64().is_some_and(|value| range.contains(value)),
    }
}
