//! Experimental design at one level of the hierarchy.

use std::collections::HashSet;

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::ordering::{Ordering, PreparedOrdering};
use crate::domain::value::{full_cross, Condition, IndependentVariable, IvValues, Value};

/// Rows are conditions, columns are bound to IVs by position.
pub type DesignMatrix = Vec<Vec<f64>>;

/// IV set, ordering and optional design matrix governing one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Design {
    pub ivs: Vec<IndependentVariable>,
    pub ordering: Ordering,
    pub design_matrix: Option<DesignMatrix>,
    /// Merged into the data of every section created from this design.
    pub extra_data: Condition,
}

impl Default for Design {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Design {
    /// Fully crossed design, shuffled once.
    pub fn new(ivs: Vec<IndependentVariable>) -> Self {
        Self {
            ivs,
            ordering: Ordering::default(),
            design_matrix: None,
            extra_data: Condition::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.ordering = ordering;
        self
    }

    /// Attach a design matrix. Row order is presumed meaningful, so the
    /// ordering falls back to [`Ordering::Fixed`] unless set afterwards.
    pub fn with_design_matrix(mut self, matrix: DesignMatrix) -> Self {
        self.design_matrix = Some(matrix);
        self.ordering = Ordering::fixed(self.ordering.number());
        self
    }

    pub fn with_extra_data(mut self, extra_data: Condition) -> Self {
        self.extra_data = extra_data;
        self
    }

    pub fn iv_names(&self) -> impl Iterator<Item = &str> {
        self.ivs.iter().map(|iv| iv.name.as_str())
    }

    pub fn declares(&self, name: &str) -> bool {
        self.iv_names().any(|n| n == name)
    }

    /// Static checks that do not depend on other levels.
    pub fn validate(&self, level: &str) -> DomainResult<()> {
        self.ordering.validate()?;

        let mut seen = HashSet::new();
        for iv in &self.ivs {
            if !seen.insert(iv.name.as_str()) {
                return Err(DomainError::DuplicateIv {
                    level: level.to_string(),
                    name: iv.name.clone(),
                });
            }
            match &iv.values {
                IvValues::Discrete(values) if values.is_empty() => {
                    return Err(DomainError::EmptyIv {
                        name: iv.name.clone(),
                    })
                }
                IvValues::Discrete(values) if values.iter().any(Value::is_nan) => {
                    return Err(DomainError::NanValue {
                        name: iv.name.clone(),
                    })
                }
                IvValues::Continuous if self.design_matrix.is_none() => {
                    return Err(DomainError::ContinuousWithoutMatrix {
                        name: iv.name.clone(),
                    })
                }
                _ => {}
            }
        }

        if let Some(matrix) = &self.design_matrix {
            self.matrix_conditions(matrix)?;
        }
        Ok(())
    }

    /// Unique conditions declared by this design (matrix rows or full cross).
    pub fn conditions(&self) -> DomainResult<Vec<Condition>> {
        match &self.design_matrix {
            Some(matrix) => self.matrix_conditions(matrix),
            None => Ok(full_cross(&self.ivs)),
        }
    }

    /// Discrete IV values are picked by rank: the k-th smallest distinct entry
    /// of a column maps to the k-th declared value, whatever its magnitude.
    fn matrix_conditions(&self, matrix: &DesignMatrix) -> DomainResult<Vec<Condition>> {
        for (row, entries) in matrix.iter().enumerate() {
            if entries.len() != self.ivs.len() {
                return Err(DomainError::MatrixShape {
                    row,
                    expected: self.ivs.len(),
                    found: entries.len(),
                });
            }
            if let Some((iv, _)) = self.ivs.iter().zip(entries).find(|(_, x)| x.is_nan()) {
                return Err(DomainError::NanValue {
                    name: iv.name.clone(),
                });
            }
        }

        let ranks: Vec<Vec<f64>> = (0..self.ivs.len())
            .map(|col| {
                matrix
                    .iter()
                    .map(|row| unsigned_zero(row[col]))
                    .sorted_by(f64::total_cmp)
                    .dedup_by(|a, b| a.total_cmp(b).is_eq())
                    .collect()
            })
            .collect();

        for (iv, distinct) in self.ivs.iter().zip(&ranks) {
            if let IvValues::Discrete(values) = &iv.values {
                if values.len() != distinct.len() {
                    return Err(DomainError::MatrixLevels {
                        name: iv.name.clone(),
                        expected: values.len(),
                        found: distinct.len(),
                    });
                }
            }
        }

        Ok(matrix
            .iter()
            .map(|row| {
                self.ivs
                    .iter()
                    .zip(row)
                    .zip(&ranks)
                    .map(|((iv, &entry), distinct)| {
                        let value = match &iv.values {
                            IvValues::Continuous => Value::Float(entry),
                            IvValues::Discrete(values) => {
                                let rank = distinct
                                    .iter()
                                    .position(|d| d.total_cmp(&unsigned_zero(entry)).is_eq())
                                    .unwrap_or_default();
                                values[rank].clone()
                            }
                        };
                        (iv.name.clone(), value)
                    })
                    .collect()
            })
            .collect())
    }

    /// Possible values of every declared IV; continuous IVs take the distinct
    /// entries of their matrix column.
    fn domains(&self) -> Vec<IndependentVariable> {
        self.ivs
            .iter()
            .enumerate()
            .map(|(col, iv)| match (&iv.values, &self.design_matrix) {
                (IvValues::Continuous, Some(matrix)) => IndependentVariable::discrete(
                    iv.name.clone(),
                    matrix.iter().map(|row| Value::Float(row[col])),
                ),
                _ => iv.clone(),
            })
            .collect()
    }

    /// First pass: cross the declared conditions with the derived IVs
    /// installed by the level below, then prepare the ordering.
    #[instrument(level = "debug", skip(self, derived, rng))]
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        level: &str,
        derived: &[IndependentVariable],
        rng: &mut R,
    ) -> DomainResult<PreparedDesign> {
        self.validate(level)?;
        for iv in derived {
            if self.declares(&iv.name) {
                return Err(DomainError::ReservedIvName {
                    level: level.to_string(),
                    name: iv.name.clone(),
                });
            }
        }

        let declared = self.conditions()?;
        let derived_conditions = full_cross(derived);
        let conditions: Vec<Condition> = declared
            .iter()
            .cartesian_product(&derived_conditions)
            .map(|(own, extra)| own.iter().chain(extra).map(|(k, v)| (k.clone(), v.clone())).collect())
            .collect();
        debug!(level, count = conditions.len(), "unique conditions");

        let ordering = self.ordering.prepare(conditions, rng)?;
        let mut domains = self.domains();
        domains.extend(derived.iter().cloned());

        Ok(PreparedDesign {
            ordering,
            domains,
            extra_data: self.extra_data.clone(),
        })
    }
}

/// `-0.0` and `0.0` are one matrix level.
fn unsigned_zero(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else {
        x
    }
}

/// Design after its first pass, ready to generate sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedDesign {
    pub ordering: PreparedOrdering,
    /// Declared and derived IVs with their possible values.
    pub domains: Vec<IndependentVariable>,
    pub extra_data: Condition,
}

impl PreparedDesign {
    /// Ordered conditions for the children of one section.
    pub fn order<R: Rng + ?Sized>(
        &self,
        parent: &Condition,
        rng: &mut R,
    ) -> DomainResult<Vec<Condition>> {
        self.ordering.order(parent, rng)
    }

    /// IV installed one level up, if this design's ordering is non-atomic.
    pub fn derived_iv(&self) -> Option<IndependentVariable> {
        self.ordering.derived_iv()
    }

    pub fn domain(&self, name: &str) -> Option<&IndependentVariable> {
        self.domains.iter().find(|iv| iv.name == name)
    }
}
