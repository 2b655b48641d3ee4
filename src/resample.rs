//! 1-D interpolation kernels for resampling uniformly sampled series.
//!
//! Resampling a dense series from `old` to `new` Hz:
//!   1. `num = ceil(n * new / old)` output samples.
//!   2. Evaluation grid: `num` evenly spaced positions over `[0, n-1]`,
//!      endpoints included.
//!   3. Interpolate the original values (implicitly sampled at the integer
//!      positions `0..n`) at the grid.
//!
//! The `new == old` case is a deliberate short-circuit handled by the
//! callers, not here.
use ndarray::Array1;

use crate::error::{Error, Result};

/// Interpolation kind. Linear is the default; nearest and cubic (natural
/// cubic spline) are also supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kind {
    #[default]
    Linear,
    Nearest,
    Cubic,
}

/// Output length when resampling `n` samples from `old` to `new` Hz:
/// `ceil(n * new / old)`.
pub fn n_resampled(n: usize, old: f64, new: f64) -> usize {
    (n as f64 * new / old).ceil() as usize
}

/// `num` evenly spaced positions spanning `[0, n-1]`, endpoints included.
pub fn sample_grid(n: usize, num: usize) -> Array1<f64> {
    if num <= 1 {
        return Array1::zeros(num);
    }
    let last = (n.saturating_sub(1)) as f64;
    Array1::from_iter((0..num).map(|i| last * i as f64 / (num - 1) as f64))
}

/// Interpolate `y` (sampled at integer positions `0..y.len()`) at `x_new`.
///
/// Positions outside `[0, n-1]` are clamped to the boundary values.
pub fn interp1d(y: &Array1<f64>, x_new: &Array1<f64>, kind: Kind) -> Result<Array1<f64>> {
    let n = y.len();
    if n == 0 {
        return Err(Error::ParameterValidation(
            "cannot interpolate an empty series".into(),
        ));
    }
    if n == 1 {
        return Ok(Array1::from_elem(x_new.len(), y[0]));
    }

    let out = match kind {
        Kind::Nearest => x_new.mapv(|x| {
            let i = x.round().clamp(0.0, (n - 1) as f64) as usize;
            y[i]
        }),
        Kind::Linear => x_new.mapv(|x| {
            let x = x.clamp(0.0, (n - 1) as f64);
            let i = x.floor() as usize;
            if i >= n - 1 {
                y[n - 1]
            } else {
                let t = x - i as f64;
                y[i] * (1.0 - t) + y[i + 1] * t
            }
        }),
        Kind::Cubic => {
            let m = spline_second_derivs(y);
            x_new.mapv(|x| {
                let x = x.clamp(0.0, (n - 1) as f64);
                let i = (x.floor() as usize).min(n - 2);
                let t = x - i as f64;
                let u = 1.0 - t;
                // Segment form over unit spacing:
                //   S(x) = m[i] u^3/6 + m[i+1] t^3/6
                //        + (y[i] - m[i]/6) u + (y[i+1] - m[i+1]/6) t
                m[i] * u * u * u / 6.0
                    + m[i + 1] * t * t * t / 6.0
                    + (y[i] - m[i] / 6.0) * u
                    + (y[i + 1] - m[i + 1] / 6.0) * t
            })
        }
    };
    Ok(out)
}

/// Natural-spline second derivatives at the knots.
///
/// With unit spacing the interior equations reduce to
///   m[i-1] + 4 m[i] + m[i+1] = 6 (y[i+1] - 2 y[i] + y[i-1])
/// with m[0] = m[n-1] = 0; solved with the Thomas algorithm.
fn spline_second_derivs(y: &Array1<f64>) -> Vec<f64> {
    let n = y.len();
    let mut m = vec![0.0; n];
    let k = n.saturating_sub(2);
    if k == 0 {
        return m;
    }

    let mut c = vec![0.0; k];
    let mut d: Vec<f64> = (1..=k)
        .map(|i| 6.0 * (y[i + 1] - 2.0 * y[i] + y[i - 1]))
        .collect();

    c[0] = 0.25;
    d[0] *= 0.25;
    for i in 1..k {
        let w = 4.0 - c[i - 1];
        c[i] = 1.0 / w;
        d[i] = (d[i] - d[i - 1]) / w;
    }

    m[k] = d[k - 1];
    for i in (1..k).rev() {
        m[i] = d[i - 1] - c[i - 1] * m[i + 1];
    }
    m
}
