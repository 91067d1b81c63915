//! Core functionalities.
mod env;
mod pipeline;
mod policy;
mod simulator;
mod space;
mod step;
pub use env::{MultiAgentVecEnv, VecEnv};
pub use pipeline::{Curried, Pipeline};
pub use policy::{Configurable, Policy, Prediction, RecurrentState};
pub use simulator::{FullSimState, SimState, Simulator};
pub use space::BoxSpace;
pub use step::{MultiStep, Step};

/// A batch of observations, one row per lane.
pub type ObsBatch = ndarray::Array2<f32>;

/// A batch of actions, one row per lane.
pub type ActBatch = ndarray::Array2<f32>;
