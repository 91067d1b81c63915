//! Continuous box spaces.
use serde::{Deserialize, Serialize};

/// A box in `R^n` given by element-wise lower and upper bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bounds.
    pub low: Vec<f32>,

    /// Upper bounds.
    pub high: Vec<f32>,
}

impl BoxSpace {
    /// Constructs a box space.
    ///
    /// Panics if the bounds differ in length.
    pub fn new(low: Vec<f32>, high: Vec<f32>) -> Self {
        assert_eq!(low.len(), high.len(), "Bounds of a box space must have equal length");
        Self { low, high }
    }

    /// A box with the same bounds `[low, high]` in every dimension.
    pub fn uniform(dim: usize, low: f32, high: f32) -> Self {
        Self::new(vec![low; dim], vec![high; dim])
    }

    /// Dimension of the space.
    pub fn dim(&self) -> usize {
        self.low.len()
    }

    /// Returns `true` if `x` lies within the bounds.
    pub fn contains(&self, x: &[f32]) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .zip(self.low.iter().zip(self.high.iter()))
                .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }

    /// Clips `x` into the bounds in place.
    pub fn clip(&self, x: &mut [f32]) {
        for (v, (lo, hi)) in x.iter_mut().zip(self.low.iter().zip(self.high.iter())) {
            *v = v.max(*lo).min(*hi);
        }
    }

    /// Maps `x` in `[-1, 1]^n` affinely onto the box.
    pub fn scale_from_unit(&self, x: &mut [f32]) {
        for (v, (lo, hi)) in x.iter_mut().zip(self.low.iter().zip(self.high.iter())) {
            *v = lo + (*v + 1.0) * 0.5 * (hi - lo);
        }
    }
}
