//! Fixing one agent slot of a multi-agent environment to a policy.
use anyhow::Result;
use log::{info, trace};
use lookback_core::{
    error::LookbackError, record::Record, ActBatch, BoxSpace, Curried, MultiAgentVecEnv, MultiStep,
    ObsBatch, Pipeline, Policy, RecurrentState, Simulator,
};
use ndarray::Axis;

/// Removes agent slot `k` from a multi-agent environment by acting for it
/// with a fixed policy.
///
/// The wrapped environment has one agent slot less; the remaining slots keep
/// their order, so slot `i` of the wrapper is slot `i` of the inner environment
/// for `i < k` and slot `i + 1` otherwise.
///
/// The policy's recurrent state is reset for lanes whose episode ended on the
/// previous step. Observation, reward and info of slot `k` are removed from the
/// step results; the info of slot `k`, merged with the internal signals of a
/// transparent policy, is available through [`Curried::curried_info`].
pub struct CurryVecEnv<E, P> {
    venv: E,
    policy: P,
    agent_idx: usize,
    obs: Option<ObsBatch>,
    state: Option<RecurrentState>,
    dones: Vec<i8>,
    transparent: Option<Vec<Record>>,
    info: Vec<Record>,
}

impl<E, P> CurryVecEnv<E, P>
where
    E: MultiAgentVecEnv,
    P: Policy,
{
    /// Wraps `venv`, acting for slot `agent_idx` with `policy`.
    pub fn new(venv: E, policy: P, agent_idx: usize) -> Result<Self> {
        let n_agents = venv.num_agents();
        if agent_idx >= n_agents {
            return Err(LookbackError::config(format!(
                "Agent index {} is out of range for {} agents",
                agent_idx, n_agents
            )));
        }
        if venv.action_space(agent_idx) != policy.action_space() {
            return Err(LookbackError::config(format!(
                "Action space of the policy does not match that of agent {}",
                agent_idx
            )));
        }
        if venv.observation_space(agent_idx).dim() != policy.observation_space().dim() {
            return Err(LookbackError::config(format!(
                "Observation dim of the policy ({}) does not match that of agent {} ({})",
                policy.observation_space().dim(),
                agent_idx,
                venv.observation_space(agent_idx).dim()
            )));
        }
        info!("Curry agent {} of {}", agent_idx, n_agents);

        let n_lanes = venv.num_lanes();
        Ok(Self {
            venv,
            policy,
            agent_idx,
            obs: None,
            state: None,
            dones: vec![0; n_lanes],
            transparent: None,
            info: vec![Record::empty(); n_lanes],
        })
    }

    /// Slot of the inner environment corresponding to slot `agent` of this wrapper.
    pub fn inner_slot(&self, agent: usize) -> usize {
        match agent < self.agent_idx {
            true => agent,
            false => agent + 1,
        }
    }

    /// Index of the curried slot in the inner environment.
    pub fn agent_idx(&self) -> usize {
        self.agent_idx
    }

    /// The fixed policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// The fixed policy.
    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Recurrent state of the fixed policy.
    pub fn state(&self) -> Option<&RecurrentState> {
        self.state.as_ref()
    }

    /// The wrapped environment.
    pub fn inner(&self) -> &E {
        &self.venv
    }
}

impl<E, P> MultiAgentVecEnv for CurryVecEnv<E, P>
where
    E: MultiAgentVecEnv,
    P: Policy,
{
    fn num_lanes(&self) -> usize {
        self.venv.num_lanes()
    }

    fn num_agents(&self) -> usize {
        self.venv.num_agents() - 1
    }

    fn observation_space(&self, agent: usize) -> &BoxSpace {
        self.venv.observation_space(self.inner_slot(agent))
    }

    fn action_space(&self, agent: usize) -> &BoxSpace {
        self.venv.action_space(self.inner_slot(agent))
    }

    fn reset(&mut self) -> Result<Vec<ObsBatch>> {
        trace!("CurryVecEnv::reset()");
        let mut obs = self.venv.reset()?;
        self.obs = Some(obs.remove(self.agent_idx));
        self.state = None;
        self.dones = vec![0; self.num_lanes()];
        self.transparent = None;
        self.info = vec![Record::empty(); self.num_lanes()];
        Ok(obs)
    }

    fn step_async(&mut self, mut acts: Vec<ActBatch>) -> Result<()> {
        if acts.len() != self.num_agents() {
            return Err(LookbackError::config(format!(
                "Expected actions for {} agents, got {}",
                self.num_agents(),
                acts.len()
            )));
        }
        let obs = self.obs.as_ref().ok_or(LookbackError::NotReset)?;
        let pred = self.policy.predict(obs, self.state.as_ref(), &self.dones)?;
        self.state = pred.state;
        self.transparent = pred.transparent;
        acts.insert(self.agent_idx, pred.act);
        self.venv.step_async(acts)
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        let mut step = self.venv.step_wait()?;
        let k = self.agent_idx;
        self.obs = Some(step.obs.remove(k));
        step.reward.remove(k);
        self.dones = step.is_done.clone();

        let mut transparent = self.transparent.take();
        for (lane, agents) in step.info.iter_mut().enumerate() {
            let mut info = agents.remove(k);
            if let Some(t) = transparent.as_mut().and_then(|t| t.get_mut(lane)) {
                info.merge_inplace(std::mem::take(t));
            }
            self.info[lane] = info;
        }

        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}

impl<E, P> Curried for CurryVecEnv<E, P>
where
    E: MultiAgentVecEnv,
    P: Policy,
{
    fn get_obs(&self) -> Option<ObsBatch> {
        self.obs.clone()
    }

    fn set_obs(&mut self, obs: &ObsBatch, lane: Option<usize>) -> Result<()> {
        match lane {
            None => self.obs = Some(obs.clone()),
            Some(lane) => {
                let num_lanes = self.num_lanes();
                if lane >= num_lanes || lane >= obs.nrows() {
                    return Err(LookbackError::LaneOutOfRange { lane, num_lanes }.into());
                }
                let current = self.obs.as_mut().ok_or(LookbackError::NotReset)?;
                current
                    .index_axis_mut(Axis(0), lane)
                    .assign(&obs.index_axis(Axis(0), lane));
            }
        }
        Ok(())
    }

    fn reset_lane(&mut self, lane: usize) {
        let initial = self.policy.initial_state(self.num_lanes());
        if let (Some(state), Some(initial)) = (self.state.as_mut(), initial) {
            state.copy_lane_from(lane, &initial);
        }
    }

    fn policy_state(&self) -> Option<&RecurrentState> {
        self.state.as_ref()
    }

    fn dones(&self) -> &[i8] {
        &self.dones
    }

    fn set_policy_state(&mut self, state: Option<&RecurrentState>, dones: &[i8]) -> Result<()> {
        let num_lanes = self.num_lanes();
        if dones.len() != num_lanes {
            return Err(LookbackError::config(format!(
                "Expected done flags of {} lanes, got {}",
                num_lanes,
                dones.len()
            )));
        }
        if let Some(n) = state.map(|s| s.n_lanes()).filter(|n| *n != num_lanes) {
            return Err(LookbackError::config(format!(
                "Expected a recurrent state of {} lanes, got {}",
                num_lanes, n
            )));
        }
        self.state = state.cloned();
        self.dones = dones.to_vec();
        Ok(())
    }

    fn curried_info(&self) -> &[Record] {
        &self.info
    }

    fn is_transparent(&self) -> bool {
        self.policy.is_transparent()
    }
}

impl<E, P> Pipeline for CurryVecEnv<E, P>
where
    E: MultiAgentVecEnv + Pipeline,
    P: Policy,
{
    fn simulator(&mut self) -> &mut dyn Simulator {
        self.venv.simulator()
    }

    fn curried(&mut self) -> Option<&mut dyn Curried> {
        Some(self)
    }

    fn take_trace(&mut self) -> Option<Record> {
        self.venv.take_trace()
    }
}
