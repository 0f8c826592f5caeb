//! Natural cubic spline used to resample response lists.

use crate::error::{RespError, Result};

/// A natural cubic spline through `(x_i, y_i)` knots.
///
/// The second derivative vanishes at both ends. Evaluation outside the knot
/// range uses the polynomial of the nearest interval.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots
    y2s: Vec<f64>,
}

impl CubicSpline {
    /// Fits the spline.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when the lengths differ, when there are fewer
    /// than two knots, or when `xs` is not strictly increasing.
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(RespError::Config(format!(
                "spline needs as many ordinates as abscissas ({} vs {})",
                ys.len(),
                xs.len()
            )));
        }
        if xs.len() < 2 {
            return Err(RespError::Config(
                "spline needs at least 2 knots".to_string(),
            ));
        }
        if let Some(i) = (1..xs.len()).find(|&i| xs[i] <= xs[i - 1]) {
            return Err(RespError::Config(format!(
                "spline knots must be strictly increasing (index {}: {} after {})",
                i,
                xs[i],
                xs[i - 1]
            )));
        }

        let n = xs.len();
        let mut y2s = vec![0.0; n];
        let mut u = vec![0.0; n];

        // tridiagonal system, forward sweep
        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2s[i - 1] + 2.0;
            y2s[i] = (sig - 1.0) / p;
            let slope = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * slope / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }
        // natural end: y2[n-1] = 0, back substitution
        y2s[n - 1] = 0.0;
        for k in (0..n - 1).rev() {
            y2s[k] = y2s[k] * y2s[k + 1] + u[k];
        }

        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            y2s,
        })
    }

    /// Index of the interval `[xs[lo], xs[lo + 1]]` used for `x`.
    fn interval(&self, x: f64) -> usize {
        let n = self.xs.len();
        // partition_point gives the first knot > x
        self.xs.partition_point(|&k| k <= x).clamp(1, n - 1) - 1
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let lo = self.interval(x);
        let hi = lo + 1;
        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;
        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.y2s[lo] + (b * b * b - b) * self.y2s[hi]) * h * h / 6.0
    }

    pub fn evaluate_all(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }
}
