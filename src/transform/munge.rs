//! Structural transformation kernels: dummy-coding, splitting, filtering,
//! substitution, NA removal, and attribute assignment.
use ndarray::Array1;

use crate::collection::VariableCollection;
use crate::entities::Value;
use crate::error::{Error, Result};
use crate::resample::Kind;
use crate::variable::{CloneOverrides, SparseRunVariable, Values, Variable};

use super::{FactorConstraint, Predicate, ReplaceAttr, VarAttr};

/// Dummy-code `name` into one indicator variable per level, named
/// `{name}{sep}{level}`, then remove the original.
///
/// Levels sort numerically for numeric data and lexically for categorical.
/// A single-level variable always yields its one indicator column of ones,
/// whatever the constraint. With `MeanZero`, reference-level rows weigh
/// `-1/(k-1)` in every retained column so each row sums to ±1.
pub(crate) fn factor(
    coll: &mut VariableCollection,
    name: &str,
    constraint: FactorConstraint,
    sep: &str,
) -> Result<()> {
    let var = coll.require(name)?.clone();
    let vals = var.values();
    let levels = vals.levels();
    if levels.is_empty() {
        return Err(Error::ParameterValidation(format!(
            "variable '{name}' has no levels to dummy-code"
        )));
    }
    let k = levels.len();
    let selected: Vec<String> = if k == 1 || matches!(constraint, FactorConstraint::FullRank) {
        levels.clone()
    } else {
        levels[1..].to_vec()
    };
    let ref_level = &levels[0];
    let ref_weight = if k > 1 { -1.0 / (k as f64 - 1.0) } else { 0.0 };

    for level in &selected {
        let data = Array1::from_iter((0..var.len()).map(|i| {
            let lab = vals.label(i);
            if lab == *level {
                1.0
            } else if matches!(constraint, FactorConstraint::MeanZero) && k > 1 && lab == *ref_level
            {
                ref_weight
            } else {
                0.0
            }
        }));
        let out = var.clone_with(CloneOverrides::named_data(
            format!("{name}{sep}{level}"),
            Values::Numeric(data),
        ))?;
        coll.insert(out);
    }
    coll.remove(name)?;
    Ok(())
}

/// Partition `name` into per-group variables.
///
/// Sparse/simple variables split row-wise on the joined labels of the `by`
/// sources (each either a same-length variable or an entity column of the
/// target's index), producing `{name}.{label}` members. Dense variables
/// split against the dummy-coded indicator columns of a single `by`
/// variable densified at the target's rate, producing
/// `{name}.{by}[{level}]` members.
pub(crate) fn split(
    coll: &mut VariableCollection,
    name: &str,
    by: &[String],
    drop_orig: bool,
) -> Result<()> {
    if by.is_empty() {
        return Err(Error::ParameterValidation(
            "split requires at least one grouping source".into(),
        ));
    }
    let var = coll.require(name)?.clone();
    let parts: Vec<Variable> = match &var {
        Variable::Dense(d) => {
            if by.len() != 1 {
                return Err(Error::ParameterValidation(
                    "dense variables split by exactly one grouping variable".into(),
                ));
            }
            let by_name = &by[0];
            let grouper = coll.require(by_name)?;
            let vals = grouper.values();
            let mut indicators = Vec::new();
            for level in vals.levels() {
                let data = Array1::from_iter(
                    (0..grouper.len()).map(|i| if vals.label(i) == level { 1.0 } else { 0.0 }),
                );
                let indicator = grouper.clone_with(CloneOverrides::data(Values::Numeric(data)))?;
                let dense_values = match &indicator {
                    Variable::Sparse(s) => s.to_dense(d.sampling_rate)?.values,
                    Variable::Dense(dv) => dv.resampled(d.sampling_rate, Kind::Linear)?.values,
                    Variable::Simple(_) => {
                        return Err(Error::CannotDensify {
                            name: by_name.clone(),
                            reason: "no run or timing metadata".into(),
                        })
                    }
                };
                indicators.push((format!("{by_name}[{level}]"), dense_values));
            }
            d.split(&indicators)?.into_iter().map(Variable::Dense).collect()
        }
        Variable::Sparse(s) => {
            let labels = row_labels(coll, &var, by)?;
            s.split(&labels)?.into_iter().map(Variable::Sparse).collect()
        }
        Variable::Simple(s) => {
            let labels = row_labels(coll, &var, by)?;
            s.split(&labels)?.into_iter().map(Variable::Simple).collect()
        }
    };
    if drop_orig {
        coll.remove(name)?;
    }
    for p in parts {
        coll.insert(p);
    }
    Ok(())
}

/// Per-row group labels for `var`: each `by` source is a same-length
/// variable's values or an entity column of the target's index; multiple
/// sources join with `_`.
fn row_labels(coll: &VariableCollection, var: &Variable, by: &[String]) -> Result<Vec<String>> {
    let n = var.len();
    let index = var.index();
    let mut columns: Vec<Vec<String>> = Vec::with_capacity(by.len());
    for b in by {
        if let Some(other) = coll.get(b) {
            if other.len() == n {
                let vals = other.values();
                columns.push((0..n).map(|i| vals.label(i)).collect());
                continue;
            }
        }
        if index.iter().any(|row| row.contains_key(b)) {
            columns.push(
                index
                    .iter()
                    .map(|row| {
                        row.get(b)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "n/a".into())
                    })
                    .collect(),
            );
        } else {
            return Err(Error::MissingVariable(b.clone()));
        }
    }
    Ok((0..n)
        .map(|i| {
            columns
                .iter()
                .map(|c| c[i].clone())
                .collect::<Vec<_>>()
                .join("_")
        })
        .collect())
}

/// Keep the rows of `name` matching `predicate`, tested against its own
/// values or an auxiliary `by` variable's values.
pub(crate) fn filter(
    coll: &mut VariableCollection,
    name: &str,
    out: &str,
    predicate: &Predicate,
    by: Option<&str>,
) -> Result<()> {
    let var = coll.require(name)?;
    let test = match by {
        Some(b) => coll.require(b)?.values(),
        None => var.values(),
    };
    if test.len() != var.len() {
        return Err(Error::ShapeMismatch { expected: var.len(), actual: test.len() });
    }
    let keep: Vec<bool> = (0..var.len())
        .map(|i| predicate.matches(&test.cell(i)))
        .collect();
    let mut kept = var.retain_rows(&keep)?;
    kept.set_name(out);
    coll.insert(kept);
    Ok(())
}

/// Substitute attribute values via the old→new mapping; unmapped entries
/// pass through.
pub(crate) fn replace(
    coll: &mut VariableCollection,
    name: &str,
    out: &str,
    mapping: &[(Value, Value)],
    attr: ReplaceAttr,
) -> Result<()> {
    let var = coll.require(name)?.clone();
    let result = match attr {
        ReplaceAttr::Values => {
            let new_values = match var.values() {
                Values::Numeric(a) => Values::Numeric(a.mapv(|v| map_num(v, mapping))),
                Values::Categorical(c) => Values::Categorical(
                    c.into_iter().map(|s| map_text(s, mapping)).collect(),
                ),
            };
            var.clone_with(CloneOverrides::named_data(out.to_string(), new_values))?
        }
        ReplaceAttr::Onset | ReplaceAttr::Duration => match var {
            Variable::Sparse(mut s) => {
                if matches!(attr, ReplaceAttr::Onset) {
                    s.onset = s.onset.mapv(|v| map_num(v, mapping));
                } else {
                    s.duration = s.duration.mapv(|v| map_num(v, mapping));
                }
                s.name = out.to_string();
                Variable::Sparse(s)
            }
            other => {
                return Err(Error::ParameterValidation(format!(
                    "variable '{}' has no event timing to replace",
                    other.name()
                )))
            }
        },
    };
    coll.insert(result);
    Ok(())
}

fn map_num(v: f64, mapping: &[(Value, Value)]) -> f64 {
    for (old, new) in mapping {
        if old.as_f64() == Some(v) {
            if let Some(n) = new.as_f64() {
                return n;
            }
        }
    }
    v
}

fn map_text(s: String, mapping: &[(Value, Value)]) -> String {
    for (old, new) in mapping {
        if matches!(old, Value::Text(t) if *t == s) {
            return new.to_string();
        }
    }
    s
}

/// Drop rows with undefined values, compacting timing and entities in
/// lockstep.
pub(crate) fn drop_na(coll: &mut VariableCollection, name: &str, out: &str) -> Result<()> {
    let var = coll.require(name)?;
    let vals = var.values();
    let keep: Vec<bool> = (0..var.len())
        .map(|i| match &vals {
            Values::Numeric(a) => !a[i].is_nan(),
            Values::Categorical(c) => c[i] != "n/a",
        })
        .collect();
    let mut kept = var.retain_rows(&keep)?;
    kept.set_name(out);
    coll.insert(kept);
    Ok(())
}

/// Copy `input_attr` of `input` onto `target_attr` of `target`, writing the
/// result to `out`.
pub(crate) fn assign(
    coll: &mut VariableCollection,
    input: &str,
    out: &str,
    target: &str,
    input_attr: VarAttr,
    target_attr: VarAttr,
) -> Result<()> {
    let src = coll.require(input)?;
    let data: Array1<f64> = match input_attr {
        VarAttr::Amplitude => src.numeric()?.clone(),
        VarAttr::Onset => sparse_of(src)?.onset.clone(),
        VarAttr::Duration => sparse_of(src)?.duration.clone(),
    };
    let dst = coll.require(target)?.clone();
    if data.len() != dst.len() {
        return Err(Error::ShapeMismatch { expected: dst.len(), actual: data.len() });
    }
    let result = match target_attr {
        VarAttr::Amplitude => dst.clone_with(CloneOverrides::named_data(
            out.to_string(),
            Values::Numeric(data),
        ))?,
        VarAttr::Onset | VarAttr::Duration => match dst {
            Variable::Sparse(mut s) => {
                if matches!(target_attr, VarAttr::Onset) {
                    s.onset = data;
                } else {
                    s.duration = data;
                }
                s.name = out.to_string();
                Variable::Sparse(s)
            }
            other => {
                return Err(Error::ParameterValidation(format!(
                    "variable '{}' has no event timing to assign onto",
                    other.name()
                )))
            }
        },
    };
    coll.insert(result);
    Ok(())
}

fn sparse_of(var: &Variable) -> Result<&SparseRunVariable> {
    match var {
        Variable::Sparse(s) => Ok(s),
        other => Err(Error::ParameterValidation(format!(
            "variable '{}' has no event timing",
            other.name()
        ))),
    }
}
