//! Environment step.
use super::ObsBatch;
use crate::record::Record;

/// The outcome of one step of a [`MultiAgentVecEnv`](crate::MultiAgentVecEnv).
#[derive(Clone, Debug)]
pub struct MultiStep {
    /// Observations, one batch per agent slot.
    pub obs: Vec<ObsBatch>,

    /// Rewards, `reward[agent][lane]`.
    pub reward: Vec<Vec<f32>>,

    /// Flag denoting if the episode of a lane ended, one entry per lane.
    pub is_done: Vec<i8>,

    /// Additional information, `info[lane][agent]`.
    pub info: Vec<Vec<Record>>,
}

impl MultiStep {
    /// The number of lanes.
    pub fn num_lanes(&self) -> usize {
        self.is_done.len()
    }

    #[inline]
    /// Returns `true` if the episode of `lane` ended in this step.
    pub fn is_done(&self, lane: usize) -> bool {
        self.is_done[lane] == 1
    }
}

/// The outcome of one step of a [`VecEnv`](crate::VecEnv).
#[derive(Clone, Debug)]
pub struct Step {
    /// Observations.
    pub obs: ObsBatch,

    /// Rewards, one per lane.
    pub reward: Vec<f32>,

    /// Flag denoting if the episode of a lane ended, one entry per lane.
    pub is_done: Vec<i8>,

    /// Additional information, one record per lane.
    pub info: Vec<Record>,
}

impl Step {
    #[inline]
    /// Returns `true` if the episode of `lane` ended in this step.
    pub fn is_done(&self, lane: usize) -> bool {
        self.is_done[lane] == 1
    }
}
