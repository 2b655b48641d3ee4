//! Named transformations over a collection's variables.
//!
//! Every operation follows one contract: take one or more named inputs from
//! a [`VariableCollection`], write one or more named outputs back into it.
//! The shared plumbing — input expansion (optionally regex), existence
//! checks, output-arity validation, densify/align pre-passes, group
//! partitioning — lives in the generic [`apply`] driver, steered by a small
//! per-operation descriptor ([`TransformSpec`]). The per-operation math is
//! in [`compute`]; structural operations are in [`munge`].
pub mod compute;
pub mod munge;

use ndarray::Array1;

use crate::collection::{get_grouper, VariableCollection};
use crate::entities::Value;
use crate::error::{Error, Result};
use crate::resample::Kind;
use crate::variable::{CloneOverrides, DenseRunVariable, Values, Variable};

/// Dummy-coding constraint for [`Transformation::Factor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactorConstraint {
    /// One indicator column per level.
    #[default]
    FullRank,
    /// Omit the first level (reduced rank).
    DropOne,
    /// Effect coding: reference-level rows weigh `-1/(k-1)` in every column.
    MeanZero,
}

/// Comparison operator for [`Predicate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Row-wise boolean test used by [`Transformation::Filter`].
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub op: Comparison,
    pub value: Value,
}

impl Predicate {
    pub fn new(op: Comparison, value: impl Into<Value>) -> Self {
        Self { op, value: value.into() }
    }

    pub fn matches(&self, cell: &Value) -> bool {
        if matches!(cell, Value::Num(v) if v.is_nan()) {
            return false;
        }
        let ord = cell.cmp(&self.value);
        match self.op {
            Comparison::Gt => ord.is_gt(),
            Comparison::Ge => ord.is_ge(),
            Comparison::Lt => ord.is_lt(),
            Comparison::Le => ord.is_le(),
            Comparison::Eq => ord.is_eq(),
            Comparison::Ne => ord.is_ne(),
        }
    }
}

/// Which attribute [`Transformation::Replace`] rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceAttr {
    #[default]
    Values,
    Onset,
    Duration,
}

/// Variable attribute read or written by [`Transformation::Assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarAttr {
    #[default]
    Amplitude,
    Onset,
    Duration,
}

/// The transformation catalog.
#[derive(Debug, Clone)]
pub enum Transformation {
    /// Z-score per group: `(x - mean) / std`, either half optional.
    Scale { demean: bool, rescale: bool },
    /// Mean-center per group.
    Demean,
    /// Weighted sum across inputs; weight count must equal input count.
    Sum { weights: Option<Vec<f64>> },
    /// Row-wise product across inputs.
    Product,
    /// Replace each target with its residuals after regressing on `other`
    /// (ordinary least squares with intercept), per group.
    Orthogonalize { other: Vec<String> },
    /// Keep values passing the threshold policy, zero the rest, optionally
    /// binarizing kept values to 1.
    Threshold { threshold: f64, binarize: bool, above: bool, signed: bool },
    /// Boolean conjunction across inputs.
    And,
    /// Boolean disjunction across inputs.
    Or,
    /// Boolean negation of each input.
    Not,
    /// Dummy-code a categorical variable into per-level indicators named
    /// `{var}{sep}{level}`; the original variable is replaced.
    Factor { constraint: FactorConstraint, sep: String },
    /// Partition a variable into per-group variables; see [`munge::split`].
    Split { by: Vec<String>, drop_orig: bool },
    /// Keep rows matching `predicate`, tested against the variable's own
    /// values or an auxiliary `by` variable's values.
    Filter { predicate: Predicate, by: Option<String> },
    /// Substitute values/onsets/durations via an explicit old→new mapping;
    /// unmapped entries pass through unchanged.
    Replace { mapping: Vec<(Value, Value)>, attr: ReplaceAttr },
    /// Drop rows with undefined values, compacting timing and entities.
    DropNa,
    /// Copy an attribute from the input variable onto `target`'s
    /// corresponding attribute, written to the output name.
    Assign { target: String, input_attr: VarAttr, target_attr: VarAttr },
    /// Duplicate a variable under a new name.
    Copy,
    /// Re-key a variable.
    Rename,
    /// Keep only the named variables.
    Select,
    /// Remove the named variables.
    Delete,
}

/// Per-operation driver configuration: which plumbing steps apply.
#[derive(Debug, Clone, Copy)]
pub struct TransformSpec {
    /// Applied independently per input (vs. all inputs jointly).
    pub loopable: bool,
    /// Honors the `groupby` option.
    pub groupable: bool,
    /// Inputs must share an index (equal length) before combination.
    pub align: bool,
    /// Inputs may be coerced to a common dense representation first.
    pub densify: bool,
}

impl Transformation {
    pub fn name(&self) -> &'static str {
        match self {
            Transformation::Scale { .. } => "scale",
            Transformation::Demean => "demean",
            Transformation::Sum { .. } => "sum",
            Transformation::Product => "product",
            Transformation::Orthogonalize { .. } => "orthogonalize",
            Transformation::Threshold { .. } => "threshold",
            Transformation::And => "and",
            Transformation::Or => "or",
            Transformation::Not => "not",
            Transformation::Factor { .. } => "factor",
            Transformation::Split { .. } => "split",
            Transformation::Filter { .. } => "filter",
            Transformation::Replace { .. } => "replace",
            Transformation::DropNa => "drop_na",
            Transformation::Assign { .. } => "assign",
            Transformation::Copy => "copy",
            Transformation::Rename => "rename",
            Transformation::Select => "select",
            Transformation::Delete => "delete",
        }
    }

    pub fn spec(&self) -> TransformSpec {
        let s = |loopable, groupable, align, densify| TransformSpec {
            loopable,
            groupable,
            align,
            densify,
        };
        match self {
            Transformation::Scale { .. } | Transformation::Demean => s(true, true, false, false),
            Transformation::Sum { .. } | Transformation::Product => s(false, false, true, true),
            Transformation::Orthogonalize { .. } => s(true, true, true, true),
            Transformation::Threshold { .. } => s(true, false, false, false),
            Transformation::And | Transformation::Or => s(false, false, true, true),
            Transformation::Not => s(true, false, false, false),
            Transformation::Factor { .. } => s(true, false, false, false),
            Transformation::Split { .. } => s(true, false, false, false),
            Transformation::Filter { .. } => s(true, false, false, false),
            Transformation::Replace { .. } => s(true, false, false, false),
            Transformation::DropNa => s(true, false, false, false),
            Transformation::Assign { .. } => s(true, false, false, false),
            Transformation::Copy | Transformation::Rename => s(true, false, false, false),
            Transformation::Select | Transformation::Delete => s(false, false, false, false),
        }
    }
}

/// Driver options shared by every transformation.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    /// Explicit output names. Loopable operations require one per input,
    /// joint operations exactly one; a mismatch is an arity error.
    pub outputs: Vec<String>,
    /// Alternative output naming: `{input}{suffix}`.
    pub output_suffix: Option<String>,
    /// Entity names partitioning rows for groupable operations.
    pub groupby: Vec<String>,
    /// Treat input names as regexes expanded against the current key set.
    pub regex_inputs: bool,
    /// Coerce inputs to a common dense representation first (operations
    /// whose descriptor allows densification).
    pub dense: bool,
    /// Densification/alignment rate; the collection default when `None`.
    pub sampling_rate: Option<f64>,
    /// Interpolation kind for any resampling the driver performs.
    pub kind: Kind,
}

/// One pipeline step: a transformation, its input names, and driver options.
#[derive(Debug, Clone)]
pub struct TransformStep {
    pub transformation: Transformation,
    pub inputs: Vec<String>,
    pub options: TransformOptions,
}

impl TransformStep {
    pub fn new(transformation: Transformation, inputs: &[&str]) -> Self {
        Self {
            transformation,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            options: TransformOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn apply(&self, coll: &mut VariableCollection) -> Result<()> {
        let inputs: Vec<&str> = self.inputs.iter().map(String::as_str).collect();
        apply(coll, &self.transformation, &inputs, &self.options)
    }
}

/// Apply `tf` to the named inputs, writing results back into `coll`.
pub fn apply(
    coll: &mut VariableCollection,
    tf: &Transformation,
    inputs: &[&str],
    opts: &TransformOptions,
) -> Result<()> {
    let spec = tf.spec();
    let names = expand_inputs(coll, inputs, opts)?;
    log::debug!("{} over {:?}", tf.name(), names);

    match tf {
        Transformation::Scale { demean, rescale } => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                let var = coll.require(name)?;
                let groups = row_groups(var, &opts.groupby);
                let mut y = var.numeric()?.clone();
                compute::scale_groups(&mut y, &groups, *demean, *rescale);
                write_numeric(coll, name, out, y)?;
            }
        }
        Transformation::Demean => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                let var = coll.require(name)?;
                let groups = row_groups(var, &opts.groupby);
                let mut y = var.numeric()?.clone();
                compute::scale_groups(&mut y, &groups, true, false);
                write_numeric(coll, name, out, y)?;
            }
        }
        Transformation::Sum { weights } => {
            let out = single_output(opts)?;
            let (cols, template) = aligned_columns(coll, &names, opts)?;
            let result = compute::weighted_sum(&cols, weights.as_deref())?;
            insert_joint(coll, template, &out, result)?;
        }
        Transformation::Product => {
            let out = single_output(opts)?;
            let (cols, template) = aligned_columns(coll, &names, opts)?;
            let result = compute::product(&cols);
            insert_joint(coll, template, &out, result)?;
        }
        Transformation::And => {
            let out = single_output(opts)?;
            let (cols, template) = aligned_columns(coll, &names, opts)?;
            let result = compute::all_nonzero(&cols);
            insert_joint(coll, template, &out, result)?;
        }
        Transformation::Or => {
            let out = single_output(opts)?;
            let (cols, template) = aligned_columns(coll, &names, opts)?;
            let result = compute::any_nonzero(&cols);
            insert_joint(coll, template, &out, result)?;
        }
        Transformation::Not => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                let y = compute::logical_not(coll.require(name)?.numeric()?);
                write_numeric(coll, name, out, y)?;
            }
        }
        Transformation::Orthogonalize { other } => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                orthogonalize_one(coll, name, out, other, opts)?;
            }
        }
        Transformation::Threshold { threshold, binarize, above, signed } => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                let mut y = coll.require(name)?.numeric()?.clone();
                compute::threshold(&mut y, *threshold, *binarize, *above, *signed);
                write_numeric(coll, name, out, y)?;
            }
        }
        Transformation::Factor { constraint, sep } => {
            for name in &names {
                munge::factor(coll, name, *constraint, sep)?;
            }
        }
        Transformation::Split { by, drop_orig } => {
            for name in &names {
                munge::split(coll, name, by, *drop_orig)?;
            }
        }
        Transformation::Filter { predicate, by } => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                munge::filter(coll, name, out, predicate, by.as_deref())?;
            }
        }
        Transformation::Replace { mapping, attr } => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                munge::replace(coll, name, out, mapping, *attr)?;
            }
        }
        Transformation::DropNa => {
            let outputs = output_names(&names, opts, spec)?;
            for (name, out) in names.iter().zip(&outputs) {
                munge::drop_na(coll, name, out)?;
            }
        }
        Transformation::Assign { target, input_attr, target_attr } => {
            let outputs = explicit_outputs(&names, opts)?;
            for (name, out) in names.iter().zip(&outputs) {
                munge::assign(coll, name, out, target, *input_attr, *target_attr)?;
            }
        }
        Transformation::Copy => {
            let outputs = explicit_outputs(&names, opts)?;
            for (name, out) in names.iter().zip(&outputs) {
                let dup = coll.require(name)?.clone_with(CloneOverrides::name(out.clone()))?;
                coll.insert(dup);
            }
        }
        Transformation::Rename => {
            let outputs = explicit_outputs(&names, opts)?;
            for (name, out) in names.iter().zip(&outputs) {
                coll.rename(name, out)?;
            }
        }
        Transformation::Select => {
            coll.select(&names)?;
        }
        Transformation::Delete => {
            for name in &names {
                coll.remove(name)?;
            }
        }
    }
    Ok(())
}

/// Expand input patterns against the collection's key set.
fn expand_inputs(
    coll: &VariableCollection,
    inputs: &[&str],
    opts: &TransformOptions,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for pat in inputs {
        if opts.regex_inputs {
            let matched = coll.match_variables(pat)?;
            if matched.is_empty() {
                return Err(Error::MissingVariable((*pat).to_string()));
            }
            names.extend(matched);
        } else {
            coll.require(pat)?;
            names.push((*pat).to_string());
        }
    }
    Ok(names)
}

/// Output names for an operation: explicit list (arity-checked), suffixed
/// input names, or the input names themselves (overwrite in place).
fn output_names(
    names: &[String],
    opts: &TransformOptions,
    spec: TransformSpec,
) -> Result<Vec<String>> {
    if !opts.outputs.is_empty() {
        let required = if spec.loopable { names.len() } else { 1 };
        if opts.outputs.len() != required {
            return Err(Error::ExpansionArity {
                inputs: names.len(),
                outputs: opts.outputs.len(),
            });
        }
        return Ok(opts.outputs.clone());
    }
    if let Some(suffix) = &opts.output_suffix {
        return Ok(names.iter().map(|n| format!("{n}{suffix}")).collect());
    }
    Ok(names.to_vec())
}

/// Like [`output_names`] but refusing to silently overwrite inputs —
/// operations whose entire point is producing a new name (copy, rename,
/// assign) must be told what to call it.
fn explicit_outputs(names: &[String], opts: &TransformOptions) -> Result<Vec<String>> {
    if !opts.outputs.is_empty() {
        if opts.outputs.len() != names.len() {
            return Err(Error::ExpansionArity {
                inputs: names.len(),
                outputs: opts.outputs.len(),
            });
        }
        return Ok(opts.outputs.clone());
    }
    if let Some(suffix) = &opts.output_suffix {
        return Ok(names.iter().map(|n| format!("{n}{suffix}")).collect());
    }
    Err(Error::ParameterValidation(
        "explicit output names (or an output suffix) are required".into(),
    ))
}

fn single_output(opts: &TransformOptions) -> Result<String> {
    match opts.outputs.as_slice() {
        [one] => Ok(one.clone()),
        [] => Err(Error::ParameterValidation(
            "an explicit output name is required".into(),
        )),
        many => Err(Error::ExpansionArity { inputs: 1, outputs: many.len() }),
    }
}

/// Row-index groups for a variable under the given grouping entities.
fn row_groups(var: &Variable, groupby: &[String]) -> Vec<Vec<usize>> {
    if groupby.is_empty() {
        return vec![(0..var.len()).collect()];
    }
    get_grouper(&var.index(), groupby).into_values().collect()
}

/// Write a numeric result back as a clone of the input variable.
fn write_numeric(
    coll: &mut VariableCollection,
    input: &str,
    output: &str,
    data: Array1<f64>,
) -> Result<()> {
    let var = coll.require(input)?;
    let out = var.clone_with(CloneOverrides::named_data(
        output.to_string(),
        Values::Numeric(data),
    ))?;
    coll.insert(out);
    Ok(())
}

/// Coerce `name` to a dense representation at `rate`.
pub(crate) fn densified(
    coll: &VariableCollection,
    name: &str,
    rate: f64,
    kind: Kind,
) -> Result<DenseRunVariable> {
    match coll.require(name)? {
        Variable::Sparse(s) => s.to_dense(rate),
        Variable::Dense(d) => d.resampled(rate, kind),
        Variable::Simple(_) => Err(Error::CannotDensify {
            name: name.to_string(),
            reason: "no run or timing metadata".into(),
        }),
    }
}

/// Gather the named inputs as equal-length numeric columns, densifying
/// first when requested. Returns the columns plus a template variable the
/// joint result is cloned from.
fn aligned_columns(
    coll: &VariableCollection,
    names: &[String],
    opts: &TransformOptions,
) -> Result<(Vec<Array1<f64>>, Variable)> {
    if names.is_empty() {
        return Err(Error::ParameterValidation("no input variables".into()));
    }
    if opts.dense {
        let rate = opts.sampling_rate.unwrap_or_else(|| coll.sampling_rate());
        let dense: Vec<DenseRunVariable> = names
            .iter()
            .map(|n| densified(coll, n, rate, opts.kind))
            .collect::<Result<_>>()?;
        let cols: Vec<Array1<f64>> = dense.iter().map(|d| d.values.clone()).collect();
        check_aligned(names, &cols)?;
        let template = Variable::Dense(dense[0].clone());
        return Ok((cols, template));
    }
    let cols: Vec<Array1<f64>> = names
        .iter()
        .map(|n| coll.require(n)?.numeric().cloned())
        .collect::<Result<_>>()?;
    check_aligned(names, &cols)?;
    Ok((cols, coll.require(&names[0])?.clone()))
}

fn check_aligned(names: &[String], cols: &[Array1<f64>]) -> Result<()> {
    let n = cols[0].len();
    if cols.iter().any(|c| c.len() != n) {
        return Err(Error::ParameterValidation(format!(
            "variables {names:?} must share an index; densify them (dense=true) or align their lengths"
        )));
    }
    Ok(())
}

fn insert_joint(
    coll: &mut VariableCollection,
    template: Variable,
    output: &str,
    data: Array1<f64>,
) -> Result<()> {
    let out = template.clone_with(CloneOverrides::named_data(
        output.to_string(),
        Values::Numeric(data),
    ))?;
    coll.insert(out);
    Ok(())
}

fn orthogonalize_one(
    coll: &mut VariableCollection,
    name: &str,
    out: &str,
    other: &[String],
    opts: &TransformOptions,
) -> Result<()> {
    if other.is_empty() {
        return Err(Error::ParameterValidation(
            "orthogonalize requires at least one 'other' variable".into(),
        ));
    }
    if opts.dense {
        let rate = opts.sampling_rate.unwrap_or_else(|| coll.sampling_rate());
        let target = densified(coll, name, rate, opts.kind)?;
        let xs: Vec<Array1<f64>> = other
            .iter()
            .map(|o| densified(coll, o, rate, opts.kind).map(|d| d.values))
            .collect::<Result<_>>()?;
        for x in &xs {
            if x.len() != target.values.len() {
                return Err(Error::ParameterValidation(format!(
                    "'{name}' and its regressors must share an index after densification"
                )));
            }
        }
        let var = Variable::Dense(target);
        let groups = row_groups(&var, &opts.groupby);
        let y = var.numeric()?;
        let resid = compute::residualize(y, &xs, &groups)?;
        let result = var.clone_with(CloneOverrides::named_data(
            out.to_string(),
            Values::Numeric(resid),
        ))?;
        coll.insert(result);
        return Ok(());
    }

    let var = coll.require(name)?.clone();
    let y = var.numeric()?.clone();
    let xs: Vec<Array1<f64>> = other
        .iter()
        .map(|o| coll.require(o)?.numeric().cloned())
        .collect::<Result<_>>()?;
    for x in &xs {
        if x.len() != y.len() {
            return Err(Error::ParameterValidation(format!(
                "'{name}' and its regressors must share an index; consider dense=true"
            )));
        }
    }
    let groups = row_groups(&var, &opts.groupby);
    let resid = compute::residualize(&y, &xs, &groups)?;
    write_numeric(coll, name, out, resid)
}
