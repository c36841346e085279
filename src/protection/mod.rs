//! # Protection
//!
//! The protected-entity ("PE") side table travels next to the rows it
//! protects: one row per data row, carrying the public flag, the user
//! identifier and the row weight. Row order and count always equal the
//! data's.
//!
//! Inside an evaluation the side table is carried explicitly in
//! [`Protected`]. [`ProtectionCodec`] converts to and from the canonical
//! four-column protected table at the boundary.

pub mod codec;

pub use codec::ProtectionCodec;

use crate::error::{DataSpecError, DataSpecResult};
use crate::tabular::table::{check_unique_labels, label_positions};
use serde::{Deserialize, Serialize};

/// Per-row protection of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectionTable {
    index: Vec<usize>,
    public: Vec<bool>,
    user_id: Vec<Option<String>>,
    weights: Vec<f64>,
}

impl ProtectionTable {
    pub fn new(
        index: Vec<usize>,
        public: Vec<bool>,
        user_id: Vec<Option<String>>,
        weights: Vec<f64>,
    ) -> DataSpecResult<Self> {
        let rows = index.len();
        if public.len() != rows || user_id.len() != rows || weights.len() != rows {
            return Err(DataSpecError::tabular(format!(
                "protection columns disagree on row count (index {}, public {}, user {}, weights {})",
                rows,
                public.len(),
                user_id.len(),
                weights.len()
            )));
        }
        check_unique_labels(&index)?;
        Ok(Self {
            index,
            public,
            user_id,
            weights,
        })
    }

    /// Protects every row with its own user and unit weight.
    pub fn for_users<S: Into<String>>(users: impl IntoIterator<Item = S>) -> Self {
        let user_id: Vec<Option<String>> = users.into_iter().map(|u| Some(u.into())).collect();
        let rows = user_id.len();
        Self {
            index: (0..rows).collect(),
            public: vec![false; rows],
            user_id,
            weights: vec![1.0; rows],
        }
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn public(&self) -> &[bool] {
        &self.public
    }

    pub fn user_id(&self) -> &[Option<String>] {
        &self.user_id
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of distinct protected users, ignoring public rows.
    pub fn distinct_users(&self) -> usize {
        let mut users: Vec<&str> = self
            .user_id
            .iter()
            .zip(&self.public)
            .filter(|(_, public)| !**public)
            .filter_map(|(user, _)| user.as_deref())
            .collect();
        users.sort_unstable();
        users.dedup();
        users.len()
    }

    /// Largest number of rows any single user contributes.
    pub fn max_multiplicity(&self) -> usize {
        let mut counts = std::collections::HashMap::new();
        for (user, public) in self.user_id.iter().zip(&self.public) {
            if let (Some(user), false) = (user, public) {
                *counts.entry(user.as_str()).or_insert(0usize) += 1;
            }
        }
        counts.into_values().max().unwrap_or(0)
    }

    /// Realigns the side table to a result's row labels.
    pub fn reindex(&self, labels: &[usize]) -> DataSpecResult<Self> {
        check_unique_labels(labels)?;
        let positions = label_positions(&self.index, labels)?;
        Ok(Self {
            index: labels.to_vec(),
            public: positions.iter().map(|&p| self.public[p]).collect(),
            user_id: positions.iter().map(|&p| self.user_id[p].clone()).collect(),
            weights: positions.iter().map(|&p| self.weights[p]).collect(),
        })
    }

    /// Replaces the row labels without touching the rows.
    pub fn with_index(mut self, index: Vec<usize>) -> DataSpecResult<Self> {
        if index.len() != self.num_rows() {
            return Err(DataSpecError::tabular(format!(
                "index of {} labels for {} protected rows",
                index.len(),
                self.num_rows()
            )));
        }
        check_unique_labels(&index)?;
        self.index = index;
        Ok(self)
    }
}

/// A value with its optional protection side table.
#[derive(Debug, Clone, PartialEq)]
pub struct Protected<T> {
    pub data: T,
    pub protection: Option<ProtectionTable>,
}

impl<T> Protected<T> {
    pub fn new(data: T, protection: Option<ProtectionTable>) -> Self {
        Self { data, protection }
    }

    pub fn unprotected(data: T) -> Self {
        Self {
            data,
            protection: None,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.protection.is_some()
    }

    pub fn into_parts(self) -> (T, Option<ProtectionTable>) {
        (self.data, self.protection)
    }
}
