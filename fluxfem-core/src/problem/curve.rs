//! Piecewise-linear material curves (B-H, K-T).

use crate::error::{Error, Result};

/// Sampled curve y(x) with strictly increasing abscissae.
///
/// Lookups interpolate linearly and clamp to the end values outside the
/// sampled range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Curve {
    points: Vec<(f64, f64)>,
}

impl Curve {
    /// Build a curve, rejecting non-finite or non-increasing abscissae.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        for (i, &(x, y)) in points.iter().enumerate() {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::InvalidMaterial(format!(
                    "curve point {} is not finite",
                    i
                )));
            }
        }
        if let Some(i) = points.windows(2).position(|w| w[1].0 <= w[0].0) {
            return Err(Error::InvalidMaterial(format!(
                "curve abscissae must increase: point {} ({}) follows {}",
                i + 1,
                points[i + 1].0,
                points[i].0
            )));
        }
        Ok(Self { points })
    }

    /// An empty curve, meaning "no curve".
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Ensure the curve passes through the origin.
    pub fn with_origin(mut self) -> Result<Self> {
        match self.points.first() {
            Some(&(x, _)) if x == 0.0 => {
                self.points[0].1 = 0.0;
                Ok(self)
            }
            Some(&(x, _)) if x < 0.0 => Err(Error::InvalidMaterial(
                "curve must start at a non-negative abscissa".into(),
            )),
            _ => {
                self.points.insert(0, (0.0, 0.0));
                Ok(self)
            }
        }
    }

    /// Segment index i such that points[i].0 <= x <= points[i+1].0.
    fn segment(&self, x: f64) -> usize {
        let n = self.points.len();
        match self.points.partition_point(|p| p.0 <= x) {
            0 => 0,
            k if k >= n => n - 2,
            k => k - 1,
        }
    }

    /// Interpolated value, clamped at both ends.
    pub fn value(&self, x: f64) -> f64 {
        match self.points.len() {
            0 => 0.0,
            1 => self.points[0].1,
            n => {
                if x <= self.points[0].0 {
                    return self.points[0].1;
                }
                if x >= self.points[n - 1].0 {
                    return self.points[n - 1].1;
                }
                let i = self.segment(x);
                let (x0, y0) = self.points[i];
                let (x1, y1) = self.points[i + 1];
                y0 + (y1 - y0) * (x - x0) / (x1 - x0)
            }
        }
    }

    /// Slope of the segment containing x (end segments outside the range).
    pub fn slope(&self, x: f64) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let i = self.segment(x);
        let (x0, y0) = self.points[i];
        let (x1, y1) = self.points[i + 1];
        (y1 - y0) / (x1 - x0)
    }

    /// ∫ y dx from the first abscissa to x, following the clamped curve.
    pub fn integral(&self, x: f64) -> f64 {
        let n = self.points.len();
        if n == 0 {
            return 0.0;
        }
        let (first, _) = self.points[0];
        if x <= first {
            return (x - first) * self.points[0].1;
        }
        let mut total = 0.0;
        for w in self.points.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x <= x1 {
                let yx = y0 + (y1 - y0) * (x - x0) / (x1 - x0);
                return total + 0.5 * (y0 + yx) * (x - x0);
            }
            total += 0.5 * (y0 + y1) * (x1 - x0);
        }
        let (xl, yl) = self.points[n - 1];
        total + yl * (x - xl)
    }
}
