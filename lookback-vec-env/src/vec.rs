//! Vectorized multi-agent environments over [`LaneSim`] lanes.
mod base;
mod config;
mod threaded;
pub use base::{DummyVecMultiEnv, LaneSim, LaneStep};
pub use config::{VecMultiEnv, VecMultiEnvConfig};
pub use threaded::ThreadedVecMultiEnv;
