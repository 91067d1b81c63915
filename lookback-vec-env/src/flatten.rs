//! Single-agent view of a one-slot multi-agent environment.
use anyhow::Result;
use lookback_core::{
    error::LookbackError, record::Record, ActBatch, BoxSpace, Curried, MultiAgentVecEnv, ObsBatch,
    Pipeline, Simulator, Step, VecEnv,
};

/// Presents a multi-agent environment with exactly one agent slot as a [`VecEnv`].
pub struct FlattenSingletonVecEnv<E> {
    venv: E,
}

impl<E: MultiAgentVecEnv> FlattenSingletonVecEnv<E> {
    /// Wraps `venv`. Fails with a configuration error unless it has one agent slot.
    pub fn new(venv: E) -> Result<Self> {
        if venv.num_agents() != 1 {
            return Err(LookbackError::config(format!(
                "Can only flatten an environment with one agent, got {}",
                venv.num_agents()
            )));
        }
        Ok(Self { venv })
    }

    /// The wrapped environment.
    pub fn inner(&self) -> &E {
        &self.venv
    }
}

impl<E: MultiAgentVecEnv> VecEnv for FlattenSingletonVecEnv<E> {
    fn num_lanes(&self) -> usize {
        self.venv.num_lanes()
    }

    fn observation_space(&self) -> &BoxSpace {
        self.venv.observation_space(0)
    }

    fn action_space(&self) -> &BoxSpace {
        self.venv.action_space(0)
    }

    fn reset(&mut self) -> Result<ObsBatch> {
        let obs = self.venv.reset()?;
        Ok(obs.into_iter().next().unwrap_or_default())
    }

    fn step_async(&mut self, act: ActBatch) -> Result<()> {
        self.venv.step_async(vec![act])
    }

    fn step_wait(&mut self) -> Result<Step> {
        let step = self.venv.step_wait()?;
        Ok(Step {
            obs: step.obs.into_iter().next().unwrap_or_default(),
            reward: step.reward.into_iter().next().unwrap_or_default(),
            is_done: step.is_done,
            info: step
                .info
                .into_iter()
                .map(|agents| agents.into_iter().next().unwrap_or_default())
                .collect(),
        })
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}

impl<E: MultiAgentVecEnv + Pipeline> Pipeline for FlattenSingletonVecEnv<E> {
    fn simulator(&mut self) -> &mut dyn Simulator {
        self.venv.simulator()
    }

    fn curried(&mut self) -> Option<&mut dyn Curried> {
        self.venv.curried()
    }

    fn take_trace(&mut self) -> Option<Record> {
        self.venv.take_trace()
    }
}
