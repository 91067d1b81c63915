//! Simulator state access.
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Snapshot of the physical state of one lane.
///
/// `set_state(lane, &get_state(lane), ..)` leaves the lane observably identical.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    /// Steps elapsed in the episode.
    pub step_count: usize,

    /// Generalized positions.
    pub qpos: Vec<f64>,

    /// Generalized velocities.
    pub qvel: Vec<f64>,
}

/// [`SimState`] together with derived simulator data (contacts and similar).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullSimState {
    /// Physical state.
    pub state: SimState,

    /// Derived data. Recomputed from `state` when a state is set with `forward`.
    pub aux: Vec<f64>,
}

/// Lane-indexed access to the simulator at the bottom of a pipeline.
pub trait Simulator {
    /// Physical state of `lane`.
    fn get_state(&self, lane: usize) -> Result<SimState>;

    /// Overwrites the physical state of `lane`.
    ///
    /// If `full` is given, its derived data is restored as well. If `forward`
    /// is `true`, derived data is recomputed from the new state.
    fn set_state(
        &mut self,
        lane: usize,
        state: &SimState,
        full: Option<&FullSimState>,
        forward: bool,
    ) -> Result<()>;

    /// Physical state of `lane` with derived data.
    fn get_full_state(&self, lane: usize) -> Result<FullSimState>;

    /// Domain-randomization radius of `lane`.
    fn get_radius(&self, lane: usize) -> Result<f32>;

    /// Sets the domain-randomization radius of `lane`.
    fn set_radius(&mut self, lane: usize, radius: f32) -> Result<()>;
}
