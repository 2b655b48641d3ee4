//! Sparse event variables: irregular onset/duration/amplitude rows.
use ndarray::Array1;

use crate::entities::{Entities, RunInfo};
use crate::error::{Error, Result};

use super::dense::DenseRunVariable;
use super::simple::group_rows;
use super::{concat_values, Values};

/// A sparse representation of one column of events.
///
/// Onsets and durations are in seconds relative to the owning run's start.
/// Events may overlap or touch; overlap is legal input and accumulates
/// additively when densified.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseRunVariable {
    pub name: String,
    pub values: Values,
    pub onset: Array1<f64>,
    pub duration: Array1<f64>,
    /// One entity row per event.
    pub entities: Vec<Entities>,
    /// Descriptors of the runs this variable spans, in value-block order.
    pub run_info: Vec<RunInfo>,
}

impl SparseRunVariable {
    pub fn new(
        name: impl Into<String>,
        values: Values,
        onset: Array1<f64>,
        duration: Array1<f64>,
        entities: Vec<Entities>,
        run_info: Vec<RunInfo>,
    ) -> Result<Self> {
        let n = values.len();
        for actual in [onset.len(), duration.len(), entities.len()] {
            if actual != n {
                return Err(Error::ShapeMismatch { expected: n, actual });
            }
        }
        Ok(Self { name: name.into(), values, onset, duration, entities, run_info })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert to a uniformly sampled dense representation at `rate` Hz.
    ///
    /// Each run contributes a zero-filled block of `ceil(rate * duration)`
    /// samples. Every event *adds* its amplitude into
    /// `[round(onset*rate), round(onset*rate) + round(duration*rate))`
    /// within its run's block; overlapping events accumulate. Events that
    /// overrun their run's block are clipped to it — upstream timing
    /// metadata is allowed to slightly exceed the declared run duration.
    pub fn to_dense(&self, rate: f64) -> Result<DenseRunVariable> {
        let amps = self.values.as_numeric().ok_or_else(|| Error::CannotDensify {
            name: self.name.clone(),
            reason: "categorical values have no dense representation".into(),
        })?;
        if self.run_info.is_empty() {
            return Err(Error::CannotDensify {
                name: self.name.clone(),
                reason: "no run descriptors".into(),
            });
        }

        let block_sizes: Vec<usize> = self.run_info.iter().map(|r| r.n_samples(rate)).collect();
        let mut starts = Vec::with_capacity(block_sizes.len());
        let mut total = 0usize;
        for &b in &block_sizes {
            starts.push(total);
            total += b;
        }

        let mut ts = Array1::<f64>::zeros(total);
        for i in 0..self.len() {
            let run = self.owning_run(i);
            let block_len = block_sizes[run];
            let start = (self.onset[i] * rate).round();
            if !start.is_finite() || start < 0.0 || start as usize >= block_len {
                continue;
            }
            let start = start as usize;
            let len = (self.duration[i] * rate).round().max(0.0) as usize;
            let end = (start + len).min(block_len);
            let base = starts[run];
            for j in start..end {
                ts[base + j] += amps[i];
            }
        }

        Ok(DenseRunVariable {
            name: self.name.clone(),
            values: ts,
            run_info: self.run_info.clone(),
            sampling_rate: rate,
        })
    }

    /// Index of the run descriptor whose entities are a subset of row `i`'s.
    fn owning_run(&self, i: usize) -> usize {
        if self.run_info.len() == 1 {
            return 0;
        }
        let row = &self.entities[i];
        self.run_info
            .iter()
            .position(|r| r.entities.iter().all(|(k, v)| row.get(k) == Some(v)))
            .unwrap_or(0)
    }

    /// Partition events by a per-row group label; see
    /// [`SimpleVariable::split`](super::SimpleVariable::split).
    pub fn split(&self, labels: &[String]) -> Result<Vec<SparseRunVariable>> {
        let groups = group_rows(self.len(), labels)?;
        groups
            .into_iter()
            .map(|(label, rows)| {
                let keep: Vec<bool> = (0..self.len()).map(|i| rows.contains(&i)).collect();
                SparseRunVariable::new(
                    format!("{}.{label}", self.name),
                    self.values.retain(&keep),
                    pick_array(&self.onset, &keep),
                    pick_array(&self.duration, &keep),
                    self.entities
                        .iter()
                        .zip(&keep)
                        .filter(|(_, &k)| k)
                        .map(|(e, _)| e.clone())
                        .collect(),
                    self.run_info.clone(),
                )
            })
            .collect()
    }

    pub(crate) fn merge(parts: &[&SparseRunVariable], name: &str) -> Result<SparseRunVariable> {
        let values = concat_values(&parts.iter().map(|p| &p.values).collect::<Vec<_>>())?;
        let onset = Array1::from_iter(parts.iter().flat_map(|p| p.onset.iter().copied()));
        let duration = Array1::from_iter(parts.iter().flat_map(|p| p.duration.iter().copied()));
        let entities = parts.iter().flat_map(|p| p.entities.iter().cloned()).collect();
        // Run order must match value-block order, so runs concatenate in
        // input order; duplicates are collapsed when adjacent parts share
        // a descriptor.
        let mut run_info: Vec<RunInfo> = Vec::new();
        for p in parts {
            for r in &p.run_info {
                if !run_info.contains(r) {
                    run_info.push(r.clone());
                }
            }
        }
        SparseRunVariable::new(name, values, onset, duration, entities, run_info)
    }
}

fn pick_array(a: &Array1<f64>, keep: &[bool]) -> Array1<f64> {
    Array1::from_iter(a.iter().zip(keep).filter(|(_, &k)| k).map(|(&v, _)| v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::entities;

    fn run(subject: &str, run_id: i64, duration: f64) -> RunInfo {
        let mut ents = entities([("subject", subject)]);
        ents.insert("run".into(), run_id.into());
        RunInfo::new(ents, duration, 2.0, (duration / 2.0) as usize)
    }

    fn events(name: &str, onset: &[f64], duration: &[f64], amp: &[f64], r: RunInfo) -> SparseRunVariable {
        let ents = onset
            .iter()
            .map(|_| r.entities.clone())
            .collect();
        SparseRunVariable::new(
            name,
            Values::Numeric(Array1::from_iter(amp.iter().copied())),
            Array1::from_iter(onset.iter().copied()),
            Array1::from_iter(duration.iter().copied()),
            ents,
            vec![r],
        )
        .unwrap()
    }

    #[test]
    fn dense_buffer_length_is_ceil() {
        let v = events("a", &[0.0], &[1.0], &[1.0], run("01", 1, 4.3));
        let d = v.to_dense(2.0).unwrap();
        assert_eq!(d.values.len(), 9);
    }

    #[test]
    fn overlapping_events_accumulate() {
        // Two events of amplitude 1 overlapping over [1, 2): samples there sum to 2.
        let v = events("a", &[0.0, 1.0], &[2.0, 1.0], &[1.0, 1.0], run("01", 1, 4.0));
        let d = v.to_dense(1.0).unwrap();
        assert_eq!(d.values.to_vec(), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn events_overrunning_run_end_are_clipped() {
        let v = events("a", &[3.0], &[5.0], &[2.0], run("01", 1, 4.0));
        let d = v.to_dense(1.0).unwrap();
        assert_eq!(d.values.to_vec(), vec![0.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn categorical_events_cannot_densify() {
        let r = run("01", 1, 4.0);
        let v = SparseRunVariable::new(
            "cond",
            Values::Categorical(vec!["go".into(), "stop".into()]),
            Array1::from_vec(vec![0.0, 2.0]),
            Array1::from_vec(vec![1.0, 1.0]),
            vec![r.entities.clone(), r.entities.clone()],
            vec![r],
        )
        .unwrap();
        assert!(matches!(v.to_dense(2.0), Err(Error::CannotDensify { .. })));
    }

    #[test]
    fn multi_run_events_land_in_their_block() {
        let r1 = run("01", 1, 3.0);
        let r2 = run("01", 2, 3.0);
        let v = SparseRunVariable::new(
            "a",
            Values::Numeric(Array1::from_vec(vec![1.0, 5.0])),
            Array1::from_vec(vec![1.0, 1.0]),
            Array1::from_vec(vec![1.0, 1.0]),
            vec![r1.entities.clone(), r2.entities.clone()],
            vec![r1, r2],
        )
        .unwrap();
        let d = v.to_dense(1.0).unwrap();
        assert_eq!(d.values.to_vec(), vec![0.0, 1.0, 0.0, 0.0, 5.0, 0.0]);
    }
}
