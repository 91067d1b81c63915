//! Policy.
use super::{ActBatch, BoxSpace, ObsBatch};
use crate::record::Record;
use anyhow::Result;
use ndarray::{Array3, ArrayView2, Axis};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

/// Recurrent state of a policy for a batch of lanes.
///
/// The array has shape `(lanes, layers, width)`. Each lineage of predictions
/// owns its own copy; lanes are never shared between copies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecurrentState(Array3<f32>);

impl RecurrentState {
    /// All-zero state.
    pub fn zeros(n_lanes: usize, n_layers: usize, width: usize) -> Self {
        Self(Array3::zeros((n_lanes, n_layers, width)))
    }

    /// Wraps an array of shape `(lanes, layers, width)`.
    pub fn from_array(array: Array3<f32>) -> Self {
        Self(array)
    }

    /// The number of lanes.
    pub fn n_lanes(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    /// State of a single lane, shape `(layers, width)`.
    pub fn lane(&self, lane: usize) -> ArrayView2<f32> {
        self.0.index_axis(Axis(0), lane)
    }

    /// Overwrites `lane` with the corresponding lane of `other`.
    pub fn copy_lane_from(&mut self, lane: usize, other: &RecurrentState) {
        self.0
            .index_axis_mut(Axis(0), lane)
            .assign(&other.0.index_axis(Axis(0), lane));
    }

    /// Overwrites lanes where `mask[i] == 1` with the corresponding lanes of `initial`.
    pub fn reset_lanes(&mut self, mask: &[i8], initial: &RecurrentState) {
        for (lane, m) in mask.iter().enumerate() {
            if *m == 1 {
                self.copy_lane_from(lane, initial);
            }
        }
    }

    /// Underlying array.
    pub fn as_array(&self) -> &Array3<f32> {
        &self.0
    }
}

/// The output of [`Policy::predict`].
#[derive(Clone, Debug)]
pub struct Prediction {
    /// Actions, one row per lane.
    pub act: ActBatch,

    /// The next recurrent state, `None` for stateless policies.
    pub state: Option<RecurrentState>,

    /// Internal signals of a transparent policy, one record per lane.
    pub transparent: Option<Vec<Record>>,
}

/// A policy acting on a batch of lanes.
///
/// `predict` maps observations, the recurrent state from the previous call and
/// the episode-reset mask to actions and the next recurrent state. Lanes with
/// `mask[i] == 1` start over from the initial state before the prediction.
/// A `None` state means the initial state.
pub trait Policy {
    /// Observation space the policy reads.
    fn observation_space(&self) -> &BoxSpace;

    /// Action space the policy writes.
    fn action_space(&self) -> &BoxSpace;

    /// Initial recurrent state for `n_lanes` lanes, `None` for stateless policies.
    fn initial_state(&self, _n_lanes: usize) -> Option<RecurrentState> {
        None
    }

    /// Predicts actions.
    fn predict(
        &mut self,
        obs: &ObsBatch,
        state: Option<&RecurrentState>,
        mask: &[i8],
    ) -> Result<Prediction>;

    /// Returns `true` if [`Prediction::transparent`] is populated.
    fn is_transparent(&self) -> bool {
        false
    }

    /// Releases resources held by the policy.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn observation_space(&self) -> &BoxSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        (**self).action_space()
    }

    fn initial_state(&self, n_lanes: usize) -> Option<RecurrentState> {
        (**self).initial_state(n_lanes)
    }

    fn predict(
        &mut self,
        obs: &ObsBatch,
        state: Option<&RecurrentState>,
        mask: &[i8],
    ) -> Result<Prediction> {
        (**self).predict(obs, state, mask)
    }

    fn is_transparent(&self) -> bool {
        (**self).is_transparent()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A configurable object.
pub trait Configurable {
    /// Configuration.
    type Config: Clone + DeserializeOwned;

    /// Builds the object.
    fn build(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Build the object with the configuration in the yaml file of the given path.
    fn build_from_path(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Sized,
    {
        let file = std::fs::File::open(path)?;
        let rdr = std::io::BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Self::build(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_lanes() {
        let mut state = RecurrentState::from_array(Array3::from_elem((3, 1, 2), 5.0));
        let initial = RecurrentState::zeros(3, 1, 2);
        state.reset_lanes(&[0, 1, 0], &initial);

        assert!(state.lane(0).iter().all(|v| *v == 5.0));
        assert!(state.lane(1).iter().all(|v| *v == 0.0));
        assert!(state.lane(2).iter().all(|v| *v == 5.0));
        assert_eq!(state.n_lanes(), 3);
    }
}
