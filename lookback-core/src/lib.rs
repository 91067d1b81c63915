#![warn(missing_docs)]
//! Core traits and types for composing vectorized multi-agent environments.
//!
//! An environment pipeline is a stack of wrappers over a batch of simulation
//! lanes. Every layer presents either [`MultiAgentVecEnv`] (one observation,
//! action and reward per agent slot) or [`VecEnv`] (a single agent), both
//! following the asynchronous `step_async`/`step_wait` contract. Layers that
//! need to reach into the pipeline, such as the lookback augmenter, go through
//! [`Pipeline`], [`Simulator`] and [`Curried`].
pub mod error;
pub mod record;
pub mod util;

mod base;
pub use base::{
    ActBatch, BoxSpace, Configurable, Curried, FullSimState, MultiAgentVecEnv, MultiStep,
    ObsBatch, Pipeline, Policy, Prediction, RecurrentState, SimState, Simulator, Step, VecEnv,
};
