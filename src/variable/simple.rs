//! Simple (untimed) variables: one entity row per observation.
use std::collections::BTreeMap;

use crate::entities::Entities;
use crate::error::{Error, Result};

use super::{concat_values, Values};

/// A design-matrix column with no timing information, e.g. per-subject
/// metadata from a participants table.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleVariable {
    pub name: String,
    pub values: Values,
    /// One entity row per value.
    pub entities: Vec<Entities>,
}

impl SimpleVariable {
    pub fn new(name: impl Into<String>, values: Values, entities: Vec<Entities>) -> Result<Self> {
        if values.len() != entities.len() {
            return Err(Error::ShapeMismatch {
                expected: values.len(),
                actual: entities.len(),
            });
        }
        Ok(Self { name: name.into(), values, entities })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Partition rows by a per-row group label. One new variable per unique
    /// label, named `{name}.{label}`, in sorted label order.
    pub fn split(&self, labels: &[String]) -> Result<Vec<SimpleVariable>> {
        let groups = group_rows(self.len(), labels)?;
        groups
            .into_iter()
            .map(|(label, rows)| {
                let keep: Vec<bool> = (0..self.len()).map(|i| rows.contains(&i)).collect();
                SimpleVariable::new(
                    format!("{}.{label}", self.name),
                    self.values.retain(&keep),
                    self.entities
                        .iter()
                        .zip(&keep)
                        .filter(|(_, &k)| k)
                        .map(|(e, _)| e.clone())
                        .collect(),
                )
            })
            .collect()
    }

    pub(crate) fn merge(parts: &[&SimpleVariable], name: &str) -> Result<SimpleVariable> {
        let values = concat_values(&parts.iter().map(|p| &p.values).collect::<Vec<_>>())?;
        let entities = parts.iter().flat_map(|p| p.entities.iter().cloned()).collect();
        SimpleVariable::new(name, values, entities)
    }
}

/// Sorted label → row-index groups; label count must match the row count.
pub(crate) fn group_rows(
    n_rows: usize,
    labels: &[String],
) -> Result<BTreeMap<String, Vec<usize>>> {
    if labels.len() != n_rows {
        return Err(Error::ShapeMismatch { expected: n_rows, actual: labels.len() });
    }
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        groups.entry(label.clone()).or_default().push(i);
    }
    Ok(groups)
}
