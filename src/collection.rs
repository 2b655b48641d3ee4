//! Collections of variables sharing a grouping level.
//!
//! A [`VariableCollection`] exclusively owns its member [`Variable`]s and is
//! the unit transformations operate on. All mutation goes through the
//! name→variable map — several names may hold clones of the same data, so
//! nothing may alias mutable state. [`VariableCollection::clone`] is the
//! sole isolation mechanism: it deep-copies the map while keeping the
//! cross-cutting [`CollectionConfig`] identity-shared.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;

use crate::entities::{Entities, Value};
use crate::error::{Error, Result};
use crate::resample::Kind;
use crate::variable::Variable;

/// Cross-cutting, immutable collection attributes. Shared (not deep-copied)
/// across clones via `Arc`.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Default densification rate in Hz.
    pub sampling_rate: f64,
    /// Fallback event duration in seconds for sources that omit one.
    pub default_duration: Option<f64>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { sampling_rate: 10.0, default_duration: None }
    }
}

/// A named set of variables, mutated only through the map.
#[derive(Debug, Clone)]
pub struct VariableCollection {
    variables: BTreeMap<String, Variable>,
    config: Arc<CollectionConfig>,
}

impl VariableCollection {
    pub fn new(variables: Vec<Variable>, config: CollectionConfig) -> Self {
        Self::with_shared_config(variables, Arc::new(config))
    }

    pub fn with_shared_config(variables: Vec<Variable>, config: Arc<CollectionConfig>) -> Self {
        let variables = variables
            .into_iter()
            .map(|v| (v.name().to_string(), v))
            .collect();
        Self { variables, config }
    }

    pub fn config(&self) -> &Arc<CollectionConfig> {
        &self.config
    }

    pub fn sampling_rate(&self) -> f64 {
        self.config.sampling_rate
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Like [`get`](Self::get) but failing with
    /// [`Error::MissingVariable`] on unknown names.
    pub fn require(&self, name: &str) -> Result<&Variable> {
        self.variables
            .get(name)
            .ok_or_else(|| Error::MissingVariable(name.to_string()))
    }

    /// Insert a variable under its own name, replacing any existing entry.
    pub fn insert(&mut self, variable: Variable) {
        self.variables
            .insert(variable.name().to_string(), variable);
    }

    pub fn remove(&mut self, name: &str) -> Result<Variable> {
        self.variables
            .remove(name)
            .ok_or_else(|| Error::MissingVariable(name.to_string()))
    }

    /// Re-key a variable, relabeling the variable itself as well.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let mut var = self.remove(old)?;
        var.set_name(new);
        self.insert(var);
        Ok(())
    }

    /// Retain only the named variables.
    pub fn select(&mut self, keep: &[String]) -> Result<()> {
        for name in keep {
            self.require(name)?;
        }
        self.variables.retain(|name, _| keep.iter().any(|k| k == name));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.variables.iter()
    }

    /// Names matching `pattern` (an unanchored regex), in sorted order.
    pub fn match_variables(&self, pattern: &str) -> Result<Vec<String>> {
        let re = Regex::new(pattern)?;
        Ok(self
            .variables
            .keys()
            .filter(|k| re.is_match(k))
            .cloned()
            .collect())
    }

    /// Pure bulk resampling: densify every still-sparse member first when
    /// `force_dense` is set, then bring every dense member to `rate`.
    ///
    /// Members that cannot be densified (simple variables without run or
    /// timing metadata, categorical event variables) fail the call rather
    /// than being skipped.
    pub fn resampled(&self, rate: f64, force_dense: bool, kind: Kind) -> Result<Self> {
        let mut out = self.clone();
        for (name, var) in &self.variables {
            match var {
                Variable::Sparse(s) if force_dense => {
                    log::debug!("densifying '{name}' at {rate} Hz");
                    out.variables
                        .insert(name.clone(), Variable::Dense(s.to_dense(rate)?));
                }
                Variable::Simple(_) if force_dense => {
                    return Err(Error::CannotDensify {
                        name: name.clone(),
                        reason: "no run or timing metadata".into(),
                    });
                }
                Variable::Dense(d) => {
                    out.variables
                        .insert(name.clone(), Variable::Dense(d.resampled(rate, kind)?));
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// In-place counterpart of [`resampled`](Self::resampled); assigns the
    /// pure result, so a failure leaves the collection untouched.
    pub fn resample(&mut self, rate: f64, force_dense: bool, kind: Kind) -> Result<()> {
        *self = self.resampled(rate, force_dense, kind)?;
        Ok(())
    }

    /// Extract the long-format design matrix.
    ///
    /// `columns` selects the source variables (all members when `None`);
    /// `filters` are entity predicates (a row passes when its value for the
    /// entity is in the allowed set); `groupby` entities form the row sort
    /// key. Rows from different sources are concatenated, never
    /// deduplicated, each tagged with its source name in `condition`.
    pub fn get_design_matrix(
        &self,
        columns: Option<&[String]>,
        groupby: &[String],
        filters: &[(String, Vec<Value>)],
    ) -> Result<DesignMatrix> {
        let names: Vec<String> = match columns {
            Some(cols) => {
                for c in cols {
                    self.require(c)?;
                }
                cols.to_vec()
            }
            None => self.variables.keys().cloned().collect(),
        };

        let mut rows = Vec::new();
        for name in &names {
            let var = self.require(name)?;
            variable_rows(var, &mut rows);
        }

        rows.retain(|row| {
            filters.iter().all(|(key, allowed)| {
                row.entities
                    .get(key)
                    .is_some_and(|v| allowed.contains(v))
            })
        });

        if !groupby.is_empty() {
            rows.sort_by_cached_key(|row| {
                groupby
                    .iter()
                    .map(|k| row.entities.get(k).cloned())
                    .collect::<Vec<_>>()
            });
        }

        let entity_columns: BTreeSet<String> = rows
            .iter()
            .flat_map(|r| r.entities.keys().cloned())
            .collect();

        Ok(DesignMatrix {
            entity_columns: entity_columns.into_iter().collect(),
            rows,
        })
    }
}

fn variable_rows(var: &Variable, out: &mut Vec<DesignRow>) {
    match var {
        Variable::Simple(v) => {
            for i in 0..v.len() {
                out.push(DesignRow {
                    condition: v.name.clone(),
                    amplitude: v.values.cell(i),
                    onset: None,
                    duration: None,
                    entities: v.entities[i].clone(),
                });
            }
        }
        Variable::Sparse(v) => {
            for i in 0..v.len() {
                out.push(DesignRow {
                    condition: v.name.clone(),
                    amplitude: v.values.cell(i),
                    onset: Some(v.onset[i]),
                    duration: Some(v.duration[i]),
                    entities: v.entities[i].clone(),
                });
            }
        }
        Variable::Dense(v) => {
            let index = v.build_entity_index();
            let times = v.times();
            let step = 1.0 / v.sampling_rate;
            for i in 0..v.len() {
                out.push(DesignRow {
                    condition: v.name.clone(),
                    amplitude: Value::Num(v.values[i]),
                    onset: Some(times[i]),
                    duration: Some(step),
                    entities: index[i].clone(),
                });
            }
        }
    }
}

/// One long-format design-matrix row.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignRow {
    pub condition: String,
    pub amplitude: Value,
    pub onset: Option<f64>,
    pub duration: Option<f64>,
    pub entities: Entities,
}

/// Long-format design matrix: the canonical
/// `{amplitude, onset, duration, condition}` columns plus one column per
/// entity seen in any row.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub entity_columns: Vec<String>,
    pub rows: Vec<DesignRow>,
}

impl DesignMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in output order.
    pub fn column_names(&self) -> Vec<String> {
        let mut cols = vec![
            "onset".to_string(),
            "duration".to_string(),
            "amplitude".to_string(),
            "condition".to_string(),
        ];
        cols.extend(self.entity_columns.iter().cloned());
        cols
    }

    /// Distinct condition names, in first-appearance order.
    pub fn conditions(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for row in &self.rows {
            if seen.insert(row.condition.clone()) {
                out.push(row.condition.clone());
            }
        }
        out
    }
}

/// Group row indices of an entity index by the named entity columns.
///
/// The returned map is the alignment key used to join heterogeneous
/// variables that do not share a literal index: rows with equal values for
/// `by` land in the same group. An empty `by` puts every row in one group.
pub fn get_grouper(
    index: &[Entities],
    by: &[String],
) -> BTreeMap<Vec<Option<Value>>, Vec<usize>> {
    let mut groups: BTreeMap<Vec<Option<Value>>, Vec<usize>> = BTreeMap::new();
    for (i, row) in index.iter().enumerate() {
        let key: Vec<Option<Value>> = by.iter().map(|k| row.get(k).cloned()).collect();
        groups.entry(key).or_default().push(i);
    }
    groups
}
