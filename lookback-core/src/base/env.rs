//! Vectorized environments.
use super::{ActBatch, BoxSpace, MultiStep, ObsBatch, Step};
use anyhow::Result;

/// A batch of multi-agent simulation lanes stepped in lock-step.
///
/// Observations and actions are indexed by agent slot first, then by lane
/// (the row of the batch). `step_async` submits actions without blocking and
/// `step_wait` blocks until every lane has advanced. A lane whose episode ends
/// is reset by the environment; the observation returned for that lane is the
/// first observation of the new episode.
pub trait MultiAgentVecEnv {
    /// The number of lanes.
    fn num_lanes(&self) -> usize;

    /// The number of agent slots.
    fn num_agents(&self) -> usize;

    /// Observation space of the given agent slot.
    fn observation_space(&self, agent: usize) -> &BoxSpace;

    /// Action space of the given agent slot.
    fn action_space(&self, agent: usize) -> &BoxSpace;

    /// Resets every lane and returns the observations of all agent slots.
    fn reset(&mut self) -> Result<Vec<ObsBatch>>;

    /// Submits actions, one batch per agent slot.
    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()>;

    /// Waits for the step submitted with [`MultiAgentVecEnv::step_async`].
    fn step_wait(&mut self) -> Result<MultiStep>;

    /// Performs a step synchronously.
    fn step(&mut self, acts: Vec<ActBatch>) -> Result<MultiStep> {
        self.step_async(acts)?;
        self.step_wait()
    }

    /// Releases resources held by the environment.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A batch of single-agent simulation lanes stepped in lock-step.
///
/// This is the interface a training loop consumes. It has the same
/// asynchronous contract as [`MultiAgentVecEnv`].
pub trait VecEnv {
    /// The number of lanes.
    fn num_lanes(&self) -> usize;

    /// Observation space.
    fn observation_space(&self) -> &BoxSpace;

    /// Action space.
    fn action_space(&self) -> &BoxSpace;

    /// Resets every lane.
    fn reset(&mut self) -> Result<ObsBatch>;

    /// Submits actions.
    fn step_async(&mut self, act: ActBatch) -> Result<()>;

    /// Waits for the step submitted with [`VecEnv::step_async`].
    fn step_wait(&mut self) -> Result<Step>;

    /// Performs a step synchronously.
    fn step(&mut self, act: ActBatch) -> Result<Step> {
        self.step_async(act)?;
        self.step_wait()
    }

    /// Releases resources held by the environment.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
