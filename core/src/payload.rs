use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Payload = BTreeMap<String, PayloadValue>;

/// Typed payload value. Lists hold scalars only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<PayloadValue>),
}

impl PayloadValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::String(_) | Self::Bool(_) | Self::List(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Scalar equality with numeric coercion: `3` and `3.0` are equal, a
    /// string never equals a number, and lists never compare as scalars.
    pub fn scalar_eq(&self, other: &PayloadValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(left), Some(right)) => left == right,
            _ => match (self, other) {
                (Self::String(left), Self::String(right)) => left == right,
                (Self::Bool(left), Self::Bool(right)) => left == right,
                _ => false,
            },
        }
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PayloadValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<PayloadValue>> From<Vec<T>> for PayloadValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Builds a payload from `(key, value)` pairs.
pub fn payload_from<K, V, I>(pairs: I) -> Payload
where
    K: Into<String>,
    V: Into<PayloadValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

pub fn validate_payload(payload: &Payload) -> Result<()> {
    for (key, value) in payload {
        if key.trim().is_empty() {
            return Err(Error::InvalidPayload(
                "payload keys must not be empty".to_string(),
            ));
        }
        validate_value(key, value, false)?;
    }
    Ok(())
}

fn validate_value(key: &str, value: &PayloadValue, nested: bool) -> Result<()> {
    match value {
        PayloadValue::Float(number) if !number.is_finite() => Err(Error::InvalidPayload(format!(
            "payload key '{key}' holds a non-finite number"
        ))),
        PayloadValue::List(_) if nested => Err(Error::InvalidPayload(format!(
            "payload key '{key}' holds a nested list"
        ))),
        PayloadValue::List(values) => values
            .iter()
            .try_for_each(|value| validate_value(key, value, true)),
        _ => Ok(()),
    }
}
