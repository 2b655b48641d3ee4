//! Dense variables: one value per uniform time sample.
use ndarray::Array1;

use crate::entities::{Entities, RunInfo};
use crate::error::{Error, Result};
use crate::resample::{interp1d, n_resampled, sample_grid, Kind};

/// A uniformly sampled representation of one column.
///
/// The per-sample entity index is never stored; it is reconstructed from
/// the run descriptors on demand (see [`build_entity_index`] and
/// [`times`]), so it can never drift out of sync with the sampling rate.
///
/// Invariant: `values.len() == Σ ceil(run.duration * sampling_rate)` over
/// `run_info`, with value blocks in descriptor order.
///
/// [`build_entity_index`]: DenseRunVariable::build_entity_index
/// [`times`]: DenseRunVariable::times
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRunVariable {
    pub name: String,
    pub values: Array1<f64>,
    pub run_info: Vec<RunInfo>,
    /// Samples per second.
    pub sampling_rate: f64,
}

impl DenseRunVariable {
    pub fn new(
        name: impl Into<String>,
        values: Array1<f64>,
        run_info: Vec<RunInfo>,
        sampling_rate: f64,
    ) -> Result<Self> {
        if !(sampling_rate > 0.0) {
            return Err(Error::ParameterValidation(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        let expected: usize = run_info.iter().map(|r| r.n_samples(sampling_rate)).sum();
        if values.len() != expected {
            return Err(Error::ShapeMismatch { expected, actual: values.len() });
        }
        Ok(Self { name: name.into(), values, run_info, sampling_rate })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Per-sample entity index: each run's entities broadcast across its
    /// sample block, in descriptor order.
    pub fn build_entity_index(&self) -> Vec<Entities> {
        self.build_index_at(self.sampling_rate)
    }

    pub(crate) fn build_index_at(&self, rate: f64) -> Vec<Entities> {
        let mut index = Vec::new();
        for run in &self.run_info {
            let reps = run.n_samples(rate);
            for _ in 0..reps {
                index.push(run.entities.clone());
            }
        }
        index
    }

    /// Synthetic per-sample time column in seconds, restarting at zero at
    /// each run boundary and advancing monotonically within a run.
    pub fn times(&self) -> Array1<f64> {
        let step = 1.0 / self.sampling_rate;
        let mut out = Vec::with_capacity(self.len());
        for run in &self.run_info {
            let reps = run.n_samples(self.sampling_rate);
            out.extend((0..reps).map(|i| i as f64 * step));
        }
        Array1::from_vec(out)
    }

    /// Pure resampling: a new variable at `rate` Hz.
    ///
    /// Values are interpolated at `ceil(n * rate / old_rate)` evenly spaced
    /// positions spanning the original sample span inclusive of endpoints.
    /// The entity index needs no separate rebuild since it is always
    /// derived from the run descriptors at the current rate. An equal-rate
    /// request returns an unchanged copy.
    pub fn resampled(&self, rate: f64, kind: Kind) -> Result<DenseRunVariable> {
        if rate == self.sampling_rate {
            return Ok(self.clone());
        }
        if !(rate > 0.0) {
            return Err(Error::ParameterValidation(format!(
                "sampling rate must be positive, got {rate}"
            )));
        }
        let n = self.values.len();
        let num = n_resampled(n, self.sampling_rate, rate);
        let grid = sample_grid(n, num);
        let values = interp1d(&self.values, &grid, kind)?;
        Ok(DenseRunVariable {
            name: self.name.clone(),
            values,
            run_info: self.run_info.clone(),
            sampling_rate: rate,
        })
    }

    /// In-place resampling: computes [`resampled`](Self::resampled) first,
    /// then assigns the result, so a failed interpolation leaves `self`
    /// untouched. An equal-rate request returns immediately.
    pub fn resample(&mut self, rate: f64, kind: Kind) -> Result<()> {
        if rate == self.sampling_rate {
            return Ok(());
        }
        *self = self.resampled(rate, kind)?;
        Ok(())
    }

    /// Multiply the value series against each binary indicator column,
    /// yielding one new variable per column named `{name}.{column}`.
    pub fn split(&self, indicators: &[(String, Array1<f64>)]) -> Result<Vec<DenseRunVariable>> {
        indicators
            .iter()
            .map(|(col, ind)| {
                if ind.len() != self.values.len() {
                    return Err(Error::ShapeMismatch {
                        expected: self.values.len(),
                        actual: ind.len(),
                    });
                }
                Ok(DenseRunVariable {
                    name: format!("{}.{col}", self.name),
                    values: &self.values * ind,
                    run_info: self.run_info.clone(),
                    sampling_rate: self.sampling_rate,
                })
            })
            .collect()
    }

    /// Merge same-named dense variables, harmonizing them to a common
    /// sampling rate first (the maximum among inputs unless `rate` is
    /// given) so differing run-level acquisition parameters cannot alias.
    pub fn merge(
        parts: &[&DenseRunVariable],
        name: &str,
        rate: Option<f64>,
    ) -> Result<DenseRunVariable> {
        let target = match rate {
            Some(r) => r,
            None => parts
                .iter()
                .map(|p| p.sampling_rate)
                .fold(f64::NEG_INFINITY, f64::max),
        };
        let harmonized: Vec<DenseRunVariable> = parts
            .iter()
            .map(|p| p.resampled(target, Kind::Linear))
            .collect::<Result<_>>()?;

        let values = Array1::from_iter(harmonized.iter().flat_map(|p| p.values.iter().copied()));
        let run_info = harmonized
            .iter()
            .flat_map(|p| p.run_info.iter().cloned())
            .collect();
        Ok(DenseRunVariable {
            name: name.to_string(),
            values,
            run_info,
            sampling_rate: target,
        })
    }
}
