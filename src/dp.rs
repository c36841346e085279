//! Contract types shared with the differential-privacy subsystem.
//!
//! Budget bookkeeping across operations happens outside this crate; here we
//! only validate the budget handed to a single DP operator and describe what
//! that operator spent as a [`PrivateQuery`].

use crate::error::{DataSpecError, DataSpecResult};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Caller-supplied privacy limit consulted by DP applicability checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyLimit {
    pub epsilon: f64,
    pub delta: f64,
}

impl PrivacyLimit {
    pub fn new(epsilon: f64, delta: f64) -> Self {
        Self { epsilon, delta }
    }

    /// Whether a DP operator may spend within this limit at all.
    pub fn is_acceptable(&self) -> bool {
        self.epsilon.is_finite() && self.epsilon > 0.0 && (0.0..1.0).contains(&self.delta)
    }
}

/// Budget and seed a DP transform is executed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DpParameters {
    pub epsilon: f64,
    pub delta: f64,
    pub seed: Option<u64>,
}

impl DpParameters {
    pub fn new(epsilon: f64, delta: f64) -> Self {
        Self {
            epsilon,
            delta,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> DataSpecResult<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(DataSpecError::invalid_budget(format!(
                "epsilon must be strictly positive, got {}",
                self.epsilon
            )));
        }
        if !(0.0..1.0).contains(&self.delta) {
            return Err(DataSpecError::invalid_budget(format!(
                "delta must lie in [0, 1), got {}",
                self.delta
            )));
        }
        Ok(())
    }
}

/// Privacy cost of one DP computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateQuery {
    pub kind: String,
    pub epsilon: f64,
    pub delta: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subqueries: Vec<PrivateQuery>,
}

impl PrivateQuery {
    /// A single mechanism invocation.
    pub fn basic(kind: impl Into<String>, epsilon: f64, delta: f64) -> Self {
        Self {
            kind: kind.into(),
            epsilon,
            delta,
            subqueries: Vec::new(),
        }
    }

    /// Sequential composition of several queries.
    pub fn composed(kind: impl Into<String>, subqueries: Vec<PrivateQuery>) -> Self {
        let epsilon = subqueries.iter().map(|q| q.epsilon).sum();
        let delta = subqueries.iter().map(|q| q.delta).sum();
        Self {
            kind: kind.into(),
            epsilon,
            delta,
            subqueries,
        }
    }

    /// Leaf queries, depth first.
    pub fn all_subqueries(&self) -> Vec<&PrivateQuery> {
        if self.subqueries.is_empty() {
            return vec![self];
        }
        self.subqueries
            .iter()
            .flat_map(PrivateQuery::all_subqueries)
            .collect()
    }

    /// JSON array of the leaf queries, as stored in the dataspec property.
    pub fn serialized_subqueries(&self) -> DataSpecResult<String> {
        Ok(serde_json::to_string(&self.all_subqueries())?)
    }
}

/// Draws Laplace noise with the given scale.
pub fn laplace_noise<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> f64 {
    let u: f64 = rng.gen_range(-0.5..0.5);
    -scale * u.signum() * (1.0 - 2.0 * u.abs()).max(f64::MIN_POSITIVE).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_epsilon_is_rejected() {
        let err = DpParameters::new(0.0, 0.0).validate().unwrap_err();
        assert!(matches!(err, DataSpecError::InvalidBudget { .. }));
        assert!(!PrivacyLimit::new(0.0, 0.0).is_acceptable());
        assert!(PrivacyLimit::new(1.0, 1e-6).is_acceptable());
    }

    #[test]
    fn test_subqueries_flatten() {
        let query = PrivateQuery::composed(
            "shape",
            vec![
                PrivateQuery::basic("laplace", 0.5, 0.0),
                PrivateQuery::composed("inner", vec![PrivateQuery::basic("gaussian", 0.25, 1e-6)]),
            ],
        );
        assert_eq!(query.epsilon, 0.75);
        let leaves = query.all_subqueries();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[1].kind, "gaussian");

        let serialized: serde_json::Value =
            serde_json::from_str(&query.serialized_subqueries().unwrap()).unwrap();
        assert_eq!(serialized.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_laplace_noise_is_seeded() {
        let a = laplace_noise(&mut StdRng::seed_from_u64(7), 1.0);
        let b = laplace_noise(&mut StdRng::seed_from_u64(7), 1.0);
        assert_eq!(a, b);
    }
}
