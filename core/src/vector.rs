use serde::{Deserialize, Serialize};
use wide::f32x8;

use crate::error::{Error, Result};

/// Squared norm under which a vector is treated as having no direction.
const ZERO_NORM_EPSILON: f32 = f32::EPSILON;

/// Similarity function a collection is ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cosine,
    Dot,
    Euclidean,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::Euclidean => "euclidean",
        }
    }
}

/// Dimensionality and metric shared by every vector of a collection.
///
/// Scores handed to callers are always "higher is closer": cosine similarity,
/// raw dot product, or the negated Euclidean distance. The index works on a
/// separate lower-is-closer distance over its own representation, see
/// [`VectorSpace::index_repr`] and [`VectorSpace::index_distance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpace {
    dimension: usize,
    metric: Metric,
}

impl VectorSpace {
    pub fn new(dimension: usize, metric: Metric) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be > 0".to_string()));
        }
        Ok(Self { dimension, metric })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Rejects vectors of the wrong length or with NaN/Inf components.
    pub fn validate(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: values.len(),
            });
        }
        if let Some(index) = values.iter().position(|value| !value.is_finite()) {
            return Err(Error::NonFiniteValue { index });
        }
        Ok(())
    }

    /// Caller-visible score of `stored` against `query`, higher is closer.
    pub fn score(&self, query: &[f32], stored: &[f32]) -> f32 {
        debug_assert_eq!(query.len(), stored.len());
        match self.metric {
            Metric::Cosine => cosine_similarity(query, stored),
            Metric::Dot => dot_product(query, stored),
            Metric::Euclidean => -l2_squared(query, stored).sqrt(),
        }
    }

    /// Representation kept inside the graph. Cosine vectors are unit
    /// normalised so the graph can compare them with a plain dot product; the
    /// stored point keeps the caller's vector untouched.
    pub fn index_repr(&self, values: &[f32]) -> Vec<f32> {
        match self.metric {
            Metric::Cosine => normalized(values),
            Metric::Dot | Metric::Euclidean => values.to_vec(),
        }
    }

    /// Graph distance between two index representations, lower is closer.
    pub fn index_distance(&self, left: &[f32], right: &[f32]) -> f32 {
        debug_assert_eq!(left.len(), right.len());
        match self.metric {
            Metric::Cosine => 1.0 - simd_dot(left, right),
            Metric::Dot => -simd_dot(left, right),
            Metric::Euclidean => simd_l2_squared(left, right),
        }
    }
}

/// Dot product of two same-length vectors.
pub fn dot_product(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    simd_dot(left, right)
}

/// Squared Euclidean distance of two same-length vectors.
pub fn l2_squared(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    simd_l2_squared(left, right)
}

/// Cosine similarity computed in a single pass. A zero-norm side has no
/// direction and scores `0.0`.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let (dot, left_sq_sum, right_sq_sum) = simd_dot_and_norms(left, right);
    if left_sq_sum <= ZERO_NORM_EPSILON || right_sq_sum <= ZERO_NORM_EPSILON {
        return 0.0;
    }
    dot / (left_sq_sum.sqrt() * right_sq_sum.sqrt())
}

/// Returns a unit-length copy, or an all-zero copy when the input has no norm.
pub fn normalized(values: &[f32]) -> Vec<f32> {
    let sq_sum = simd_dot(values, values);
    if sq_sum <= ZERO_NORM_EPSILON {
        return vec![0.0; values.len()];
    }
    let inv_norm = 1.0 / sq_sum.sqrt();
    values.iter().map(|value| value * inv_norm).collect()
}

const SIMD_WIDTH: usize = 8;

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_scan(
    left: &[f32],
    right: &[f32],
    mut simd_step: impl FnMut(f32x8, f32x8),
    mut scalar_step: impl FnMut(f32, f32),
) {
    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);

    for (left_chunk, right_chunk) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        simd_step(load_f32x8(left_chunk), load_f32x8(right_chunk));
    }

    for (&left_value, &right_value) in left_chunks.remainder().iter().zip(right_chunks.remainder())
    {
        scalar_step(left_value, right_value);
    }
}

fn simd_dot(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| simd_sum += left_v * right_v,
        |left_value, right_value| scalar_sum += left_value * right_value,
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_l2_squared(left: &[f32], right: &[f32]) -> f32 {
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            let delta = left_v - right_v;
            simd_sum += delta * delta;
        },
        |left_value, right_value| {
            let delta = left_value - right_value;
            scalar_sum += delta * delta;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

fn simd_dot_and_norms(left: &[f32], right: &[f32]) -> (f32, f32, f32) {
    let mut dot_sum = f32x8::ZERO;
    let mut left_sq_sum = f32x8::ZERO;
    let mut right_sq_sum = f32x8::ZERO;
    let mut dot_scalar = 0.0;
    let mut left_sq_scalar = 0.0;
    let mut right_sq_scalar = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            dot_sum += left_v * right_v;
            left_sq_sum += left_v * left_v;
            right_sq_sum += right_v * right_v;
        },
        |left_value, right_value| {
            dot_scalar += left_value * right_value;
            left_sq_scalar += left_value * left_value;
            right_sq_scalar += right_value * right_value;
        },
    );

    (
        dot_sum.reduce_add() + dot_scalar,
        left_sq_sum.reduce_add() + left_sq_scalar,
        right_sq_sum.reduce_add() + right_sq_scalar,
    )
}
