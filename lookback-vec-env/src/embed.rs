//! Embedding a fixed victim policy into a multi-agent environment.
use crate::curry::CurryVecEnv;
use anyhow::Result;
use lookback_core::{
    record::Record, ActBatch, BoxSpace, Curried, MultiAgentVecEnv, MultiStep, ObsBatch, Pipeline,
    Policy, Simulator,
};

/// A [`CurryVecEnv`] fixing the victim's slot to the victim policy.
///
/// Unlike a plain curry, closing the environment also releases the victim policy.
pub struct EmbedVictimVecEnv<E, P> {
    venv: CurryVecEnv<E, P>,
    victim_closed: bool,
    env_closed: bool,
}

impl<E, P> EmbedVictimVecEnv<E, P>
where
    E: MultiAgentVecEnv,
    P: Policy,
{
    /// Embeds `victim` in slot `victim_index` of `venv`.
    pub fn new(venv: E, victim: P, victim_index: usize) -> Result<Self> {
        Ok(Self {
            venv: CurryVecEnv::new(venv, victim, victim_index)?,
            victim_closed: false,
            env_closed: false,
        })
    }

    /// Slot of the victim in the wrapped environment.
    pub fn victim_index(&self) -> usize {
        self.venv.agent_idx()
    }

    /// The victim policy.
    pub fn victim(&self) -> &P {
        self.venv.policy()
    }
}

impl<E, P> MultiAgentVecEnv for EmbedVictimVecEnv<E, P>
where
    E: MultiAgentVecEnv,
    P: Policy,
{
    fn num_lanes(&self) -> usize {
        self.venv.num_lanes()
    }

    fn num_agents(&self) -> usize {
        self.venv.num_agents()
    }

    fn observation_space(&self, agent: usize) -> &BoxSpace {
        self.venv.observation_space(agent)
    }

    fn action_space(&self, agent: usize) -> &BoxSpace {
        self.venv.action_space(agent)
    }

    fn reset(&mut self) -> Result<Vec<ObsBatch>> {
        self.venv.reset()
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        self.venv.step_async(acts)
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        self.venv.step_wait()
    }

    /// Closes the victim policy and the wrapped environment.
    ///
    /// Both are attempted even if one fails, and the first error is returned.
    /// A part that closed successfully is not closed again on a later call.
    fn close(&mut self) -> Result<()> {
        let victim = match self.victim_closed {
            true => Ok(()),
            false => self.venv.policy_mut().close(),
        };
        self.victim_closed |= victim.is_ok();

        let env = match self.env_closed {
            true => Ok(()),
            false => self.venv.close(),
        };
        self.env_closed |= env.is_ok();

        victim.and(env)
    }
}

impl<E, P> Pipeline for EmbedVictimVecEnv<E, P>
where
    E: MultiAgentVecEnv + Pipeline,
    P: Policy,
{
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
