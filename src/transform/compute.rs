//! Numeric transformation kernels.
//!
//! Pure functions over value series; the driver in the parent module owns
//! all collection plumbing. NaNs are skipped by the moment statistics (a
//! series with missing rows scales by the statistics of its defined part)
//! and propagate through the arithmetic kernels.
use ndarray::Array1;

use crate::error::{Error, Result};

/// Mean over the non-NaN entries of `y` at `rows`.
fn nan_mean(y: &Array1<f64>, rows: &[usize]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &i in rows {
        if !y[i].is_nan() {
            sum += y[i];
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample standard deviation (ddof = 1) over the non-NaN entries.
fn nan_std(y: &Array1<f64>, rows: &[usize], mean: f64) -> f64 {
    let mut ss = 0.0;
    let mut n = 0usize;
    for &i in rows {
        if !y[i].is_nan() {
            let d = y[i] - mean;
            ss += d * d;
            n += 1;
        }
    }
    if n < 2 {
        f64::NAN
    } else {
        (ss / (n - 1) as f64).sqrt()
    }
}

/// Demean and/or rescale each group of `y` in place.
pub fn scale_groups(y: &mut Array1<f64>, groups: &[Vec<usize>], demean: bool, rescale: bool) {
    for rows in groups {
        let mean = nan_mean(y, rows);
        let std = nan_std(y, rows, mean);
        for &i in rows {
            if demean {
                y[i] -= mean;
            }
            if rescale {
                y[i] /= std;
            }
        }
    }
}

/// Weighted row-wise sum across equal-length columns. The weight count must
/// equal the column count; omitted weights default to ones.
pub fn weighted_sum(cols: &[Array1<f64>], weights: Option<&[f64]>) -> Result<Array1<f64>> {
    let w: Vec<f64> = match weights {
        Some(w) => {
            if w.len() != cols.len() {
                return Err(Error::ParameterValidation(format!(
                    "sum() weights must have one element per summed variable; got {} weights for {} variables",
                    w.len(),
                    cols.len()
                )));
            }
            w.to_vec()
        }
        None => vec![1.0; cols.len()],
    };
    let n = cols.first().map_or(0, |c| c.len());
    let mut out = Array1::<f64>::zeros(n);
    for (col, wi) in cols.iter().zip(&w) {
        out = out + col.mapv(|v| v * wi);
    }
    Ok(out)
}

/// Row-wise product across equal-length columns.
pub fn product(cols: &[Array1<f64>]) -> Array1<f64> {
    let n = cols.first().map_or(0, |c| c.len());
    let mut out = Array1::<f64>::ones(n);
    for col in cols {
        out = out * col;
    }
    out
}

/// Row-wise conjunction: 1.0 where every column is nonzero.
pub fn all_nonzero(cols: &[Array1<f64>]) -> Array1<f64> {
    let n = cols.first().map_or(0, |c| c.len());
    Array1::from_iter((0..n).map(|i| {
        if cols.iter().all(|c| c[i] != 0.0) {
            1.0
        } else {
            0.0
        }
    }))
}

/// Row-wise disjunction: 1.0 where any column is nonzero.
pub fn any_nonzero(cols: &[Array1<f64>]) -> Array1<f64> {
    let n = cols.first().map_or(0, |c| c.len());
    Array1::from_iter((0..n).map(|i| {
        if cols.iter().any(|c| c[i] != 0.0) {
            1.0
        } else {
            0.0
        }
    }))
}

/// Boolean negation: 1.0 where the value is zero.
pub fn logical_not(y: &Array1<f64>) -> Array1<f64> {
    y.mapv(|v| if v == 0.0 { 1.0 } else { 0.0 })
}

/// Threshold `y` in place.
///
/// `above` picks which side of the cut-off survives; with `signed = false`
/// both the data and the threshold are replaced by their absolute values
/// before comparison (so surviving entries are absolute-valued when not
/// binarizing). Dropped entries become 0, kept entries become 1 when
/// `binarize` is set.
pub fn threshold(y: &mut Array1<f64>, threshold: f64, binarize: bool, above: bool, signed: bool) {
    let thr = if signed { threshold } else { threshold.abs() };
    for v in y.iter_mut() {
        let data = if signed { *v } else { v.abs() };
        let keep = if above { data >= thr } else { data <= thr };
        *v = match (keep, binarize) {
            (false, _) => 0.0,
            (true, true) => 1.0,
            (true, false) => data,
        };
    }
}

/// Per-group ordinary-least-squares residualization.
///
/// Within each group, regress `y` on the `xs` columns plus an intercept and
/// replace `y`'s entries with `y - X·β` (the intercept's contribution is
/// retained, so group means survive). The returned series has, per group,
/// zero sample correlation with every regressor.
pub fn residualize(
    y: &Array1<f64>,
    xs: &[Array1<f64>],
    groups: &[Vec<usize>],
) -> Result<Array1<f64>> {
    let mut out = y.clone();
    let p = xs.len();
    for rows in groups {
        let n = rows.len();
        if n == 0 {
            continue;
        }
        // Normal equations over the augmented design A = [1 | X].
        let dim = p + 1;
        let mut ata = vec![vec![0.0; dim]; dim];
        let mut aty = vec![0.0; dim];
        for &r in rows {
            let mut a_row = Vec::with_capacity(dim);
            a_row.push(1.0);
            for x in xs {
                a_row.push(x[r]);
            }
            for i in 0..dim {
                aty[i] += a_row[i] * y[r];
                for j in 0..dim {
                    ata[i][j] += a_row[i] * a_row[j];
                }
            }
        }
        let beta = solve_linear(ata, aty)?;
        for &r in rows {
            let mut fit = 0.0;
            for (j, x) in xs.iter().enumerate() {
                fit += x[r] * beta[j + 1];
            }
            out[r] = y[r] - fit;
        }
    }
    Ok(out)
}

/// Gaussian elimination with partial pivoting.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(Error::ParameterValidation(
                "singular design matrix in orthogonalize (collinear regressors?)".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let f = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= f * a[col][k];
            }
            b[row] -= f * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut s = b[row];
        for k in row + 1..n {
            s -= a[row][k] * x[k];
        }
        x[row] = s / a[row][row];
    }
    Ok(x)
}
