//! Tabulated functions with forward and inverse piecewise-linear lookup.
//!
//! A [`Distribution2D`] stores `(x, y)` samples ordered by `x`. Physics tables
//! usually store natural logarithms in both coordinates, so linear
//! interpolation in the stored coordinates is log-log interpolation of the
//! underlying function. The inverse lookup [`Distribution2D::interpolate_x`] is
//! what Monte-Carlo sampling uses to invert a cumulative distribution.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Values at or below zero are floored to this before taking a logarithm.
pub const LOG_FLOOR: f64 = 1e-100;

/// Errors raised while building a table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("distribution must contain at least one sample")]
    Empty,

    #[error("x and y sample counts differ ({xs} vs {ys})")]
    LengthMismatch { xs: usize, ys: usize },

    #[error("x values must be non-decreasing (index {index})")]
    NonMonotonic { index: usize },

    #[error("non-finite sample at index {index}")]
    NonFinite { index: usize },
}

pub type DistributionResult<T> = Result<T, DistributionError>;

/// Direction of the y samples, used to pick the inverse-lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum YOrder {
    Increasing,
    Decreasing,
    Unordered,
}

/// A sampled function `y(x)` with `x` non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution2D {
    xs: Vec<f64>,
    ys: Vec<f64>,
    y_order: YOrder,
}

impl Distribution2D {
    /// Build a table from separate x and y vectors.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> DistributionResult<Self> {
        if xs.len() != ys.len() {
            return Err(DistributionError::LengthMismatch {
                xs: xs.len(),
                ys: ys.len(),
            });
        }
        if xs.is_empty() {
            return Err(DistributionError::Empty);
        }
        for (index, (x, y)) in xs.iter().zip(&ys).enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(DistributionError::NonFinite { index });
            }
        }
        if let Some(index) = xs.windows(2).position(|w| w[1] < w[0]) {
            return Err(DistributionError::NonMonotonic { index: index + 1 });
        }

        let y_order = if ys.windows(2).all(|w| w[1] >= w[0]) {
            YOrder::Increasing
        } else if ys.windows(2).all(|w| w[1] <= w[0]) {
            YOrder::Decreasing
        } else {
            YOrder::Unordered
        };

        Ok(Self { xs, ys, y_order })
    }

    /// Build a table from `(x, y)` pairs.
    pub fn from_points(points: &[(f64, f64)]) -> DistributionResult<Self> {
        let (xs, ys) = points.iter().copied().unzip();
        Self::new(xs, ys)
    }

    /// Number of samples (always at least one).
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Always false: construction rejects empty tables.
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn x(&self, index: usize) -> f64 {
        self.xs[index]
    }

    pub fn y(&self, index: usize) -> f64 {
        self.ys[index]
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn first_x(&self) -> f64 {
        self.xs[0]
    }

    pub fn last_x(&self) -> f64 {
        self.xs[self.xs.len() - 1]
    }

    pub fn first_y(&self) -> f64 {
        self.ys[0]
    }

    pub fn last_y(&self) -> f64 {
        self.ys[self.ys.len() - 1]
    }

    /// Index of the first sample whose x exceeds the argument (`len()` if none does).
    pub fn find_x_index(&self, x: f64) -> usize {
        self.xs.partition_point(|&xi| xi <= x)
    }

    /// Index `i` of the segment `[x_i, x_{i+1}]` used to evaluate at `x`.
    ///
    /// Arguments outside the table reuse the first or last segment.
    fn segment_for_x(&self, x: f64) -> usize {
        let last_segment = self.xs.len() - 2;
        self.find_x_index(x).saturating_sub(1).min(last_segment)
    }

    /// Linear interpolation in the stored coordinates.
    ///
    /// Outside the tabulated range the first or last segment is extended.
    pub fn interpolate_y(&self, x: f64) -> f64 {
        if self.xs.len() == 1 {
            return self.ys[0];
        }
        let i = self.segment_for_x(x);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let dx = x1 - x0;
        if dx == 0.0 {
            return y0;
        }
        let slope = (y1 - y0) / dx;
        y0 + slope * (x - x0)
    }

    /// Inverse lookup: the x at which the table reaches `y`.
    ///
    /// Values outside the tabulated y range return the first or last x exactly
    /// (clamped, never extrapolated). On a flat segment the left end is returned.
    pub fn interpolate_x(&self, y: f64) -> f64 {
        let n = self.ys.len();
        if n == 1 {
            return self.xs[0];
        }

        match self.y_order {
            YOrder::Increasing => {
                if y <= self.ys[0] {
                    return self.xs[0];
                }
                if y >= self.ys[n - 1] {
                    return self.xs[n - 1];
                }
                let i = self.ys.partition_point(|&yi| yi <= y) - 1;
                self.inverse_in_segment(i, y)
            }
            YOrder::Decreasing => {
                if y >= self.ys[0] {
                    return self.xs[0];
                }
                if y <= self.ys[n - 1] {
                    return self.xs[n - 1];
                }
                let i = self.ys.partition_point(|&yi| yi >= y) - 1;
                self.inverse_in_segment(i, y)
            }
            YOrder::Unordered => {
                for i in 0..n - 1 {
                    let (lo, hi) = if self.ys[i] <= self.ys[i + 1] {
                        (self.ys[i], self.ys[i + 1])
                    } else {
                        (self.ys[i + 1], self.ys[i])
                    };
                    if lo <= y && y <= hi {
                        return self.inverse_in_segment(i, y);
                    }
                }
                if (y - self.ys[0]).abs() <= (y - self.ys[n - 1]).abs() {
                    self.xs[0]
                } else {
                    self.xs[n - 1]
                }
            }
        }
    }

    fn inverse_in_segment(&self, i: usize, y: f64) -> f64 {
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let (y0, y1) = (self.ys[i], self.ys[i + 1]);
        let dy = y1 - y0;
        if dy == 0.0 {
            return x0;
        }
        x0 + (y - y0) * (x1 - x0) / dy
    }

    /// Integral of the piecewise-linear function over `[x_lo, x_hi]`.
    pub fn integral(&self, x_lo: f64, x_hi: f64) -> f64 {
        if x_hi <= x_lo || self.xs.len() == 1 {
            return self.ys[0] * (x_hi - x_lo).max(0.0);
        }

        let mut sum = 0.0;
        let mut x_prev = x_lo;
        let mut y_prev = self.interpolate_y(x_lo);
        let first_inside = self.find_x_index(x_lo);
        for i in first_inside..self.xs.len() {
            let x = self.xs[i];
            if x >= x_hi {
                break;
            }
            let y = self.ys[i];
            sum += 0.5 * (y + y_prev) * (x - x_prev);
            x_prev = x;
            y_prev = y;
        }
        let y_hi = self.interpolate_y(x_hi);
        sum + 0.5 * (y_hi + y_prev) * (x_hi - x_prev)
    }

    /// Mean of y over the window `[x_lo, x_hi]`.
    pub fn integral_mean(&self, x_lo: f64, x_hi: f64) -> f64 {
        if x_hi <= x_lo {
            return self.interpolate_y(x_lo);
        }
        self.integral(x_lo, x_hi) / (x_hi - x_lo)
    }
}

/// Running cumulative integral of a density, stored as `(ln x, ln F(x))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogCumulative {
    /// `ln x` against `ln ∫_0^x f`.
    pub table: Distribution2D,
    /// `∫_0^upper f`.
    pub total: f64,
    /// Mean of x weighted by f over the whole table range.
    pub mean_x: f64,
}

impl LogCumulative {
    /// Tabulate `∫_0^x f(t) dt` on `steps` log-spaced points between `lower` and `upper`.
    ///
    /// `head` is the integral from zero up to `lower`, usually an analytic
    /// small-argument expansion. Each step adds one trapezoid; a weighted
    /// numerator/denominator pair is carried along for the mean.
    pub fn build<F: Fn(f64) -> f64>(
        density: F,
        lower: f64,
        upper: f64,
        steps: usize,
        head: f64,
    ) -> DistributionResult<Self> {
        if steps < 2 || lower <= 0.0 || upper <= lower {
            return Err(DistributionError::Empty);
        }

        let log_step = (upper / lower).ln() / (steps - 1) as f64;
        let mut xs = Vec::with_capacity(steps);
        let mut ys = Vec::with_capacity(steps);

        let mut sum = head;
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut x_prev = lower;
        let mut f_prev = density(lower);

        xs.push(lower.ln());
        ys.push(sum.max(LOG_FLOOR).ln());

        for i in 1..steps {
            let x = lower * (log_step * i as f64).exp();
            let f = density(x);
            let dx = x - x_prev;
            let area = 0.5 * (f + f_prev) * dx;
            sum += area;
            numerator += 0.5 * (f * x + f_prev * x_prev) * dx;
            denominator += area;

            xs.push(x.ln());
            ys.push(sum.max(LOG_FLOOR).ln());
            x_prev = x;
            f_prev = f;
        }

        let mean_x = if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        };

        Ok(Self {
            table: Distribution2D::new(xs, ys)?,
            total: sum,
            mean_x,
        })
    }

    /// `∫_0^x f`, with x clamped to the tabulated range.
    pub fn cumulative_at(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        let ln_x = x.ln().clamp(self.table.first_x(), self.table.last_x());
        self.table.interpolate_y(ln_x).exp()
    }

    /// Inverse of [`LogCumulative::cumulative_at`]; clamps outside the table.
    pub fn inverse(&self, cumulative: f64) -> f64 {
        let ln_c = cumulative.max(LOG_FLOOR).ln();
        self.table.interpolate_x(ln_c).exp()
    }
}

/// Running cumulative integral on a linear grid, stored as `(x, F(x))`.
pub fn linear_cumulative<F: Fn(f64) -> f64>(
    density: F,
    lower: f64,
    upper: f64,
    steps: usize,
) -> DistributionResult<(Distribution2D, f64)> {
    if steps < 2 || upper <= lower {
        return Err(DistributionError::Empty);
    }
    let dx = (upper - lower) / (steps - 1) as f64;
    let xs: Vec<f64> = (0..steps).map(|i| lower + dx * i as f64).collect();
    let fs: Vec<f64> = xs.iter().map(|&x| density(x)).collect();
    cumulative_from_samples(&xs, &fs)
}

/// Trapezoidal running integral of pre-sampled density values.
///
/// Negative densities are clamped to zero so the result stays non-decreasing.
pub fn cumulative_from_samples(xs: &[f64], fs: &[f64]) -> DistributionResult<(Distribution2D, f64)> {
    if xs.len() != fs.len() {
        return Err(DistributionError::LengthMismatch {
            xs: xs.len(),
            ys: fs.len(),
        });
    }
    if xs.is_empty() {
        return Err(DistributionError::Empty);
    }

    let mut ys = Vec::with_capacity(xs.len());
    let mut sum = 0.0;
    ys.push(0.0);
    for i in 1..xs.len() {
        let f0 = fs[i - 1].max(0.0);
        let f1 = fs[i].max(0.0);
        sum += 0.5 * (f0 + f1) * (xs[i] - xs[i - 1]);
        ys.push(sum);
    }
    Ok((Distribution2D::new(xs.to_vec(), ys)?, sum))
}
