//! Configuration of vectorized multi-agent environments.
use super::{DummyVecMultiEnv, LaneSim, ThreadedVecMultiEnv};
use anyhow::Result;
use log::info;
use lookback_core::{
    ActBatch, BoxSpace, FullSimState, MultiAgentVecEnv, MultiStep, ObsBatch, Pipeline, SimState,
    Simulator,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`VecMultiEnv`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct VecMultiEnvConfig {
    /// The number of lanes.
    pub n_lanes: usize,

    /// Base seed. Lane `i` is seeded with `seed + i`.
    pub seed: u64,

    /// Step lanes sequentially instead of in worker threads.
    pub use_dummy: bool,
}

impl Default for VecMultiEnvConfig {
    fn default() -> Self {
        Self {
            n_lanes: 1,
            seed: 0,
            use_dummy: false,
        }
    }
}

impl VecMultiEnvConfig {
    /// Sets the number of lanes.
    pub fn n_lanes(mut self, v: usize) -> Self {
        self.n_lanes = v;
        self
    }

    /// Sets the base seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets whether lanes are stepped sequentially.
    pub fn use_dummy(mut self, v: bool) -> Self {
        self.use_dummy = v;
        self
    }

    /// Constructs [`VecMultiEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`VecMultiEnvConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A vectorized multi-agent environment, sequential or threaded.
pub enum VecMultiEnv<S> {
    /// Lanes stepped in the caller's thread.
    Dummy(DummyVecMultiEnv<S>),

    /// Lanes stepped in worker threads.
    Threaded(ThreadedVecMultiEnv),
}

impl<S: LaneSim + Send + 'static> VecMultiEnv<S> {
    /// Builds the environment, creating each lane's simulator from its seed.
    pub fn build(config: &VecMultiEnvConfig, mut make_sim: impl FnMut(u64) -> Result<S>) -> Result<Self> {
        let sims = (0..config.n_lanes)
            .map(|i| make_sim(config.seed + i as u64))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Build vectorized environment with {} lanes ({})",
            config.n_lanes,
            match config.use_dummy {
                true => "sequential",
                false => "threaded",
            }
        );

        match config.use_dummy {
            true => Ok(Self::Dummy(DummyVecMultiEnv::new(sims)?)),
            false => Ok(Self::Threaded(ThreadedVecMultiEnv::new(sims)?)),
        }
    }
}

impl<S: LaneSim> MultiAgentVecEnv for VecMultiEnv<S> {
    fn num_lanes(&self) -> usize {
        match self {
            Self::Dummy(e) => e.num_lanes(),
            Self::Threaded(e) => e.num_lanes(),
        }
    }

    fn num_agents(&self) -> usize {
        match self {
            Self::Dummy(e) => e.num_agents(),
            Self::Threaded(e) => e.num_agents(),
        }
    }

    fn observation_space(&self, agent: usize) -> &BoxSpace {
        match self {
            Self::Dummy(e) => e.observation_space(agent),
            Self::Threaded(e) => e.observation_space(agent),
        }
    }

    fn action_space(&self, agent: usize) -> &BoxSpace {
        match self {
            Self::Dummy(e) => e.action_space(agent),
            Self::Threaded(e) => e.action_space(agent),
        }
    }

    fn reset(&mut self) -> Result<Vec<ObsBatch>> {
        match self {
            Self::Dummy(e) => e.reset(),
            Self::Threaded(e) => e.reset(),
        }
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        match self {
            Self::Dummy(e) => e.step_async(acts),
            Self::Threaded(e) => e.step_async(acts),
        }
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        match self {
            Self::Dummy(e) => e.step_wait(),
            Self::Threaded(e) => e.step_wait(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Self::Dummy(e) => e.close(),
            Self::Threaded(e) => e.close(),
        }
    }
}

impl<S: LaneSim> Simulator for VecMultiEnv<S> {
    fn get_state(&self, lane: usize) -> Result<SimState> {
        match self {
            Self::Dummy(e) => e.get_state(lane),
            Self::Threaded(e) => e.get_state(lane),
        }
    }

    fn set_state(
        &mut self,
        lane: usize,
        state: &SimState,
        full: Option<&FullSimState>,
        forward: bool,
    ) -> Result<()> {
        match self {
            Self::Dummy(e) => e.set_state(lane, state, full, forward),
            Self::Threaded(e) => e.set_state(lane, state, full, forward),
        }
    }

    fn get_full_state(&self, lane: usize) -> Result<FullSimState> {
        match self {
            Self::Dummy(e) => e.get_full_state(lane),
            Self::Threaded(e) => e.get_full_state(lane),
        }
    }

    fn get_radius(&self, lane: usize) -> Result<f32> {
        match self {
            Self::Dummy(e) => e.get_radius(lane),
            Self::Threaded(e) => e.get_radius(lane),
        }
    }

    fn set_radius(&mut self, lane: usize, radius: f32) -> Result<()> {
        match self {
            Self::Dummy(e) => e.set_radius(lane, radius),
            Self::Threaded(e) => e.set_radius(lane, radius),
        }
    }
}

impl<S: LaneSim> Pipeline for VecMultiEnv<S> {
    fn simulator(&mut self) -> &mut dyn Simulator {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_vec_multi_env_config() -> Result<()> {
        let config = VecMultiEnvConfig::default().n_lanes(4).seed(42).use_dummy(true);
        let dir = TempDir::new("vec_multi_env_config")?;
        let path = dir.path().join("vec_multi_env_config.yaml");
        config.save(&path)?;
        let config_ = VecMultiEnvConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
