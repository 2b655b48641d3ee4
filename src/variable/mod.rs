//! The variable hierarchy: simple, sparse (event), and dense (sampled) shapes.
//!
//! All three concrete shapes implement one capability contract — clone with
//! explicit overrides, aggregation to a coarser entity level, class-wise
//! merging, row splitting — dispatched through the [`Variable`] tagged enum.
//! Dense is deliberately not built on top of sparse: row-per-event and
//! row-per-sample layouts share nothing internally.
pub mod dense;
pub mod simple;
pub mod sparse;

pub use dense::DenseRunVariable;
pub use simple::SimpleVariable;
pub use sparse::SparseRunVariable;

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array1;

use crate::entities::{fmt_num, AggFunc, Entities, Level, RunInfo, Value};
use crate::error::{Error, Result};

/// Backing storage for per-row values.
///
/// Numeric and categorical data never mix within one variable; operations
/// that require numbers fail on categorical storage instead of coercing.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Numeric(Array1<f64>),
    Categorical(Vec<String>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Numeric(a) => a.len(),
            Values::Categorical(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Values::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&Array1<f64>> {
        match self {
            Values::Numeric(a) => Some(a),
            Values::Categorical(_) => None,
        }
    }

    /// Row rendered as a design-matrix cell.
    pub fn cell(&self, i: usize) -> Value {
        match self {
            Values::Numeric(a) => Value::Num(a[i]),
            Values::Categorical(c) => Value::Text(c[i].clone()),
        }
    }

    /// Row rendered as a level label (factor/split naming).
    pub fn label(&self, i: usize) -> String {
        match self {
            Values::Numeric(a) => fmt_num(a[i]),
            Values::Categorical(c) => c[i].clone(),
        }
    }

    /// Unique level labels in sorted order (numeric order for numeric data,
    /// lexical for categorical). NaNs are not levels.
    pub fn levels(&self) -> Vec<String> {
        match self {
            Values::Numeric(a) => {
                let mut uniq: Vec<f64> = Vec::new();
                for &v in a.iter() {
                    if v.is_nan() {
                        continue;
                    }
                    if !uniq.iter().any(|&u| u == v) {
                        uniq.push(v);
                    }
                }
                uniq.sort_by(|x, y| x.total_cmp(y));
                uniq.into_iter().map(fmt_num).collect()
            }
            Values::Categorical(c) => {
                let set: BTreeSet<&String> = c.iter().collect();
                set.into_iter().cloned().collect()
            }
        }
    }

    fn retain(&self, keep: &[bool]) -> Values {
        match self {
            Values::Numeric(a) => Values::Numeric(Array1::from_iter(
                a.iter().zip(keep).filter(|(_, &k)| k).map(|(&v, _)| v),
            )),
            Values::Categorical(c) => Values::Categorical(
                c.iter()
                    .zip(keep)
                    .filter(|(_, &k)| k)
                    .map(|(v, _)| v.clone())
                    .collect(),
            ),
        }
    }
}

/// Explicit clone overrides.
///
/// The enumerated fields are the whole override surface; there is no
/// dynamic attribute injection, so unknown keys cannot exist.
#[derive(Debug, Clone, Default)]
pub struct CloneOverrides {
    pub name: Option<String>,
    pub data: Option<Values>,
}

impl CloneOverrides {
    pub fn name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), data: None }
    }

    pub fn data(data: Values) -> Self {
        Self { name: None, data: Some(data) }
    }

    pub fn named_data(name: impl Into<String>, data: Values) -> Self {
        Self { name: Some(name.into()), data: Some(data) }
    }
}

/// A design-matrix column in any of its three concrete shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Simple(SimpleVariable),
    Sparse(SparseRunVariable),
    Dense(DenseRunVariable),
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Simple(v) => &v.name,
            Variable::Sparse(v) => &v.name,
            Variable::Dense(v) => &v.name,
        }
    }

    pub fn set_name(&mut self, name: &str) {
        match self {
            Variable::Simple(v) => v.name = name.to_string(),
            Variable::Sparse(v) => v.name = name.to_string(),
            Variable::Dense(v) => v.name = name.to_string(),
        }
    }

    /// Observation (row or sample) count.
    pub fn len(&self) -> usize {
        match self {
            Variable::Simple(v) => v.values.len(),
            Variable::Sparse(v) => v.values.len(),
            Variable::Dense(v) => v.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the values; fails on categorical storage.
    pub fn numeric(&self) -> Result<&Array1<f64>> {
        match self {
            Variable::Dense(v) => Ok(&v.values),
            Variable::Simple(SimpleVariable { name, values, .. })
            | Variable::Sparse(SparseRunVariable { name, values, .. }) => {
                values.as_numeric().ok_or_else(|| {
                    Error::ParameterValidation(format!(
                        "variable '{name}' holds categorical values; numeric data required"
                    ))
                })
            }
        }
    }

    /// The values as stored.
    pub fn values(&self) -> Values {
        match self {
            Variable::Simple(v) => v.values.clone(),
            Variable::Sparse(v) => v.values.clone(),
            Variable::Dense(v) => Values::Numeric(v.values.clone()),
        }
    }

    /// Entity index, one row per observation. For dense variables this is
    /// reconstructed from the run descriptors, never stored.
    pub fn index(&self) -> Vec<Entities> {
        match self {
            Variable::Simple(v) => v.entities.clone(),
            Variable::Sparse(v) => v.entities.clone(),
            Variable::Dense(v) => v.build_entity_index(),
        }
    }

    /// Run descriptors, if this shape carries them.
    pub fn run_info(&self) -> Option<&[RunInfo]> {
        match self {
            Variable::Simple(_) => None,
            Variable::Sparse(v) => Some(&v.run_info),
            Variable::Dense(v) => Some(&v.run_info),
        }
    }

    /// Deep copy with explicit overrides. Replacement data must match the
    /// current observation count exactly.
    pub fn clone_with(&self, overrides: CloneOverrides) -> Result<Variable> {
        let mut out = self.clone();
        if let Some(data) = overrides.data {
            if data.len() != self.len() {
                return Err(Error::ShapeMismatch {
                    expected: self.len(),
                    actual: data.len(),
                });
            }
            match &mut out {
                Variable::Simple(v) => v.values = data,
                Variable::Sparse(v) => v.values = data,
                Variable::Dense(v) => match data {
                    Values::Numeric(a) => v.values = a,
                    Values::Categorical(_) => {
                        return Err(Error::ParameterValidation(format!(
                            "dense variable '{}' cannot hold categorical values",
                            v.name
                        )))
                    }
                },
            }
        }
        if let Some(name) = overrides.name {
            out.set_name(&name);
        }
        Ok(out)
    }

    /// Roll observations up to `unit` level, reducing each group with `func`.
    pub fn aggregate(&self, unit: Level, func: AggFunc) -> Result<SimpleVariable> {
        let values = self.numeric()?;
        let index = self.index();
        Ok(aggregate_rows(self.name(), values, &index, unit, func))
    }

    /// Keep only the rows where `keep` is true, compacting values, timing,
    /// and entities in lockstep. Dense variables cannot be row-filtered
    /// because their sample count is fixed by the run descriptors.
    pub fn retain_rows(&self, keep: &[bool]) -> Result<Variable> {
        if keep.len() != self.len() {
            return Err(Error::ShapeMismatch {
                expected: self.len(),
                actual: keep.len(),
            });
        }
        let pick =
            |ents: &[Entities]| -> Vec<Entities> {
                ents.iter()
                    .zip(keep)
                    .filter(|(_, &k)| k)
                    .map(|(e, _)| e.clone())
                    .collect()
            };
        match self {
            Variable::Simple(v) => Ok(Variable::Simple(SimpleVariable {
                name: v.name.clone(),
                values: v.values.retain(keep),
                entities: pick(&v.entities),
            })),
            Variable::Sparse(v) => Ok(Variable::Sparse(SparseRunVariable {
                name: v.name.clone(),
                values: v.values.retain(keep),
                onset: filter_array(&v.onset, keep),
                duration: filter_array(&v.duration, keep),
                entities: pick(&v.entities),
                run_info: v.run_info.clone(),
            })),
            Variable::Dense(v) => Err(Error::ParameterValidation(format!(
                "dense variable '{}' cannot be row-filtered",
                v.name
            ))),
        }
    }
}

fn filter_array(a: &Array1<f64>, keep: &[bool]) -> Array1<f64> {
    Array1::from_iter(a.iter().zip(keep).filter(|(_, &k)| k).map(|(&v, _)| v))
}

/// Group rows by the entity columns at or above `unit` that are present in
/// the index and reduce each group's values with `func`.
fn aggregate_rows(
    name: &str,
    values: &Array1<f64>,
    index: &[Entities],
    unit: Level,
    func: AggFunc,
) -> SimpleVariable {
    let present: Vec<&str> = unit
        .grouping_entities()
        .iter()
        .copied()
        .filter(|col| index.iter().any(|row| row.contains_key(*col)))
        .collect();

    let mut groups: BTreeMap<Vec<Option<Value>>, Vec<f64>> = BTreeMap::new();
    for (i, row) in index.iter().enumerate() {
        let key: Vec<Option<Value>> = present.iter().map(|c| row.get(*c).cloned()).collect();
        groups.entry(key).or_default().push(values[i]);
    }

    let mut out_values = Vec::with_capacity(groups.len());
    let mut out_entities = Vec::with_capacity(groups.len());
    for (key, xs) in &groups {
        out_values.push(func.reduce(xs));
        let ents: Entities = present
            .iter()
            .zip(key)
            .filter_map(|(c, v)| v.clone().map(|v| (c.to_string(), v)))
            .collect();
        out_entities.push(ents);
    }

    SimpleVariable {
        name: name.to_string(),
        values: Values::Numeric(Array1::from_vec(out_values)),
        entities: out_entities,
    }
}

/// Concatenate same-kind value blocks row-wise.
pub(crate) fn concat_values(parts: &[&Values]) -> Result<Values> {
    if parts.iter().all(|p| p.is_numeric()) {
        let mut out = Vec::new();
        for p in parts {
            if let Values::Numeric(a) = p {
                out.extend(a.iter().copied());
            }
        }
        Ok(Values::Numeric(Array1::from_vec(out)))
    } else if parts.iter().all(|p| !p.is_numeric()) {
        let mut out = Vec::new();
        for p in parts {
            if let Values::Categorical(c) = p {
                out.extend(c.iter().cloned());
            }
        }
        Ok(Values::Categorical(out))
    } else {
        Err(Error::ParameterValidation(
            "cannot merge numeric and categorical values".into(),
        ))
    }
}

/// Merge same-class variables row-wise.
///
/// All inputs must share a name unless `name` overrides it; mixed concrete
/// classes are rejected. Dense inputs are first harmonized to a common
/// sampling rate (the maximum among them) before concatenation.
pub fn merge_variables(variables: &[Variable], name: Option<&str>) -> Result<Variable> {
    if variables.is_empty() {
        return Err(Error::ParameterValidation("no variables to merge".into()));
    }

    let names: BTreeSet<String> = variables.iter().map(|v| v.name().to_string()).collect();
    if names.len() > 1 && name.is_none() {
        return Err(Error::NameConflict(names.into_iter().collect()));
    }
    let merged_name = name.unwrap_or_else(|| variables[0].name()).to_string();

    match &variables[0] {
        Variable::Simple(_) => {
            let parts: Vec<&SimpleVariable> = variables
                .iter()
                .map(|v| match v {
                    Variable::Simple(s) => Ok(s),
                    _ => Err(mixed_class_error()),
                })
                .collect::<Result<_>>()?;
            Ok(Variable::Simple(SimpleVariable::merge(&parts, &merged_name)?))
        }
        Variable::Sparse(_) => {
            let parts: Vec<&SparseRunVariable> = variables
                .iter()
                .map(|v| match v {
                    Variable::Sparse(s) => Ok(s),
                    _ => Err(mixed_class_error()),
                })
                .collect::<Result<_>>()?;
            Ok(Variable::Sparse(SparseRunVariable::merge(&parts, &merged_name)?))
        }
        Variable::Dense(_) => {
            let parts: Vec<&DenseRunVariable> = variables
                .iter()
                .map(|v| match v {
                    Variable::Dense(d) => Ok(d),
                    _ => Err(mixed_class_error()),
                })
                .collect::<Result<_>>()?;
            Ok(Variable::Dense(DenseRunVariable::merge(&parts, &merged_name, None)?))
        }
    }
}

fn mixed_class_error() -> Error {
    Error::ParameterValidation("variables of different classes cannot be merged".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::entities;

    fn simple(name: &str, vals: &[f64], subjects: &[&str]) -> Variable {
        Variable::Simple(SimpleVariable {
            name: name.to_string(),
            values: Values::Numeric(Array1::from_iter(vals.iter().copied())),
            entities: subjects.iter().map(|s| entities([("subject", *s)])).collect(),
        })
    }

    #[test]
    fn clone_with_rejects_wrong_shape() {
        let v = simple("a", &[1.0, 2.0, 3.0], &["01", "01", "02"]);
        let bad = CloneOverrides::data(Values::Numeric(Array1::zeros(2)));
        assert!(matches!(
            v.clone_with(bad),
            Err(Error::ShapeMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn clone_with_renames() {
        let v = simple("a", &[1.0], &["01"]);
        let c = v.clone_with(CloneOverrides::name("b")).unwrap();
        assert_eq!(c.name(), "b");
        assert_eq!(v.name(), "a");
    }

    #[test]
    fn aggregate_means_per_subject() {
        let v = simple("a", &[1.0, 3.0, 10.0], &["01", "01", "02"]);
        let agg = v.aggregate(Level::Subject, AggFunc::Mean).unwrap();
        let vals = agg.values.as_numeric().unwrap();
        assert_eq!(vals.to_vec(), vec![2.0, 10.0]);
        assert_eq!(agg.entities.len(), 2);
    }

    #[test]
    fn aggregate_dataset_is_grand_reduction() {
        let v = simple("a", &[1.0, 3.0, 8.0], &["01", "01", "02"]);
        let agg = v.aggregate(Level::Dataset, AggFunc::Sum).unwrap();
        let vals = agg.values.as_numeric().unwrap();
        assert_eq!(vals.to_vec(), vec![12.0]);
    }

    #[test]
    fn merge_rejects_name_conflicts() {
        let a = simple("a", &[1.0], &["01"]);
        let b = simple("b", &[2.0], &["02"]);
        assert!(matches!(
            merge_variables(&[a.clone(), b.clone()], None),
            Err(Error::NameConflict(_))
        ));
        let merged = merge_variables(&[a, b], Some("ab")).unwrap();
        assert_eq!(merged.name(), "ab");
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_rejects_mixed_classes() {
        let a = simple("a", &[1.0], &["01"]);
        let b = Variable::Sparse(SparseRunVariable {
            name: "a".into(),
            values: Values::Numeric(Array1::zeros(1)),
            onset: Array1::zeros(1),
            duration: Array1::ones(1),
            entities: vec![entities([("subject", "01")])],
            run_info: vec![],
        });
        assert!(merge_variables(&[a, b], None).is_err());
    }

    #[test]
    fn levels_sort_numerically() {
        let v = Values::Numeric(Array1::from_vec(vec![10.0, -1.0, 2.0, 10.0, f64::NAN]));
        assert_eq!(v.levels(), vec!["-1", "2", "10"]);
    }

    #[test]
    fn retain_rows_compacts_in_lockstep() {
        let v = simple("a", &[1.0, 2.0, 3.0], &["01", "02", "03"]);
        let kept = v.retain_rows(&[true, false, true]).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.index()[1], entities([("subject", "03")]));
    }
}
