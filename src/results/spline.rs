//! Interpolating cubic spline and gait-cycle normalisation
//!
//! Not-a-knot end conditions: the third derivative is continuous across
//! the second and second-to-last knots, so a cubic is reproduced exactly.
//! Outside the knots the end polynomials are extended.

use crate::{Error, Result};

/// Samples on a normalised cycle (0, 1, ..., 100 percent).
pub const CYCLE_POINTS: usize = 101;

/// Cubic spline through `(x, y)`, stored as knot second derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit the spline.
    ///
    /// Two knots give a line, three a parabola.
    ///
    /// # Errors
    ///
    /// Returns `Other` if fewer than two knots are given, the lengths
    /// differ, a value is not finite, or `x` is not strictly increasing
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::Other(format!(
                "spline needs equal lengths, got {} x and {} y",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(Error::Other(format!(
                "spline needs at least 2 knots, got {}",
                x.len()
            )));
        }
        if let Some(i) = x.iter().chain(y).position(|v| !v.is_finite()) {
            return Err(Error::Other(format!("spline input {i} is not finite")));
        }
        if let Some(i) = x.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::Other(format!(
                "spline knots must increase strictly; x[{}] = {} follows {}",
                i + 1,
                x[i + 1],
                x[i]
            )));
        }

        let m = second_derivatives(x, y);
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    /// Value at `t`.
    #[must_use]
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        // Segment whose left knot is the last one <= t, clamped to the ends.
        let i = self.x.partition_point(|&k| k <= t).clamp(1, n - 1) - 1;
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let a = x1 - t;
        let b = t - x0;
        m0 * a.powi(3) / (6.0 * h)
            + m1 * b.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * a
            + (y1 / h - m1 * h / 6.0) * b
    }
}

fn second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

    match n {
        2 => return vec![0.0; 2],
        3 => {
            let m = 6.0 * (slope[1] - slope[0]) / (3.0 * (h[0] + h[1]));
            return vec![m; 3];
        }
        _ => {}
    }

    // Interior unknowns M1..M(n-2)
    let k = n - 2;
    let mut sub = vec![0.0; k];
    let mut diag = vec![0.0; k];
    let mut sup = vec![0.0; k];
    let mut rhs = vec![0.0; k];
    for j in 0..k {
        let i = j + 1;
        sub[j] = h[i - 1];
        diag[j] = 2.0 * (h[i - 1] + h[i]);
        sup[j] = h[i];
        rhs[j] = 6.0 * (slope[i] - slope[i - 1]);
    }

    // M0 = ((h0 + h1) M1 - h0 M2) / h1
    diag[0] = h[0] * (h[0] + h[1]) / h[1] + 2.0 * (h[0] + h[1]);
    sup[0] = h[1] - h[0] * h[0] / h[1];
    // M(n-1) = ((h(n-3) + h(n-2)) M(n-2) - h(n-2) M(n-3)) / h(n-3)
    let (hp, hl) = (h[n - 3], h[n - 2]);
    sub[k - 1] = hp - hl * hl / hp;
    diag[k - 1] = 2.0 * (hp + hl) + hl * (hp + hl) / hp;

    let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs);

    let mut m = Vec::with_capacity(n);
    m.push(((h[0] + h[1]) * interior[0] - h[0] * interior[1]) / h[1]);
    m.extend_from_slice(&interior);
    m.push(((hp + hl) * interior[k - 1] - hl * interior[k - 2]) / hp);
    m
}

/// Thomas algorithm; `sub[0]` and `sup[last]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = if i + 1 < n { sup[i] / denom } else { 0.0 };
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    out
}

/// `points` evenly spaced values from `start` to `end` inclusive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linspace(start: f64, end: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (points - 1) as f64;
            (0..points)
                .map(|k| if k == points - 1 { end } else { start + step * k as f64 })
                .collect()
        }
    }
}

/// Resample `values(time)` onto [`CYCLE_POINTS`] samples between the cycle's
/// `start` and `end` times.
///
/// # Errors
///
/// Returns `Other` if the series cannot be fitted (see [`CubicSpline::new`])
pub fn normalize_cycle(time: &[f64], values: &[f64], start: f64, end: f64) -> Result<Vec<f64>> {
    let spline = CubicSpline::new(time, values)?;
    Ok(linspace(start, end, CYCLE_POINTS)
        .into_iter()
        .map(|t| spline.eval(t))
        .collect())
}

/// The percent-of-cycle axis, 0 to 100.
#[must_use]
pub fn percent_cycle() -> Vec<f64> {
    linspace(0.0, 100.0, CYCLE_POINTS)
}
