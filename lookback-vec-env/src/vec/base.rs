//! Lane simulators and the sequential vectorized environment.
use anyhow::Result;
use log::trace;
use lookback_core::{
    error::LookbackError, record::Record, ActBatch, BoxSpace, FullSimState, MultiAgentVecEnv,
    MultiStep, ObsBatch, Pipeline, SimState, Simulator,
};
use ndarray::Array2;

/// Outcome of stepping a single lane.
#[derive(Clone, Debug)]
pub struct LaneStep {
    /// Observation of each agent slot.
    pub obs: Vec<Vec<f32>>,

    /// Reward of each agent slot.
    pub reward: Vec<f32>,

    /// `true` if the episode ended on this step.
    pub is_done: bool,

    /// Information of each agent slot.
    pub info: Vec<Record>,
}

/// A single multi-agent simulation lane.
///
/// Stepping must be deterministic given the state: two lanes holding equal
/// [`SimState`]s and radii produce equal outcomes for equal actions.
pub trait LaneSim {
    /// The number of agent slots.
    fn num_agents(&self) -> usize;

    /// Observation space of an agent slot.
    fn observation_space(&self, agent: usize) -> BoxSpace;

    /// Action space of an agent slot.
    fn action_space(&self, agent: usize) -> BoxSpace;

    /// Starts a new episode and returns the observation of each agent slot.
    fn reset(&mut self) -> Vec<Vec<f32>>;

    /// Advances the lane by one step.
    fn step(&mut self, acts: &[Vec<f32>]) -> LaneStep;

    /// Physical state.
    fn get_state(&self) -> SimState;

    /// Overwrites the physical state, see [`Simulator::set_state`].
    fn set_state(&mut self, state: &SimState, full: Option<&FullSimState>, forward: bool)
        -> Result<()>;

    /// Physical state with derived data.
    fn get_full_state(&self) -> FullSimState;

    /// Domain-randomization radius.
    fn radius(&self) -> f32;

    /// Sets the domain-randomization radius.
    fn set_radius(&mut self, radius: f32);
}

/// Steps a lane, resetting it when the episode ends.
///
/// On a terminal step the returned observation is the first observation of
/// the next episode, while reward and info belong to the terminal step.
pub(crate) fn step_with_reset<S: LaneSim + ?Sized>(sim: &mut S, acts: &[Vec<f32>]) -> LaneStep {
    let mut step = sim.step(acts);
    if step.is_done {
        step.obs = sim.reset();
    }
    step
}

/// Splits per-agent action batches into per-lane action lists.
pub(crate) fn lane_actions(acts: &[ActBatch], n_agents: usize, n_lanes: usize) -> Result<Vec<Vec<Vec<f32>>>> {
    if acts.len() != n_agents {
        return Err(LookbackError::config(format!(
            "Expected actions for {} agents, got {}",
            n_agents,
            acts.len()
        )));
    }
    if let Some(a) = acts.iter().find(|a| a.nrows() != n_lanes) {
        return Err(LookbackError::config(format!(
            "Expected an action batch of {} lanes, got {}",
            n_lanes,
            a.nrows()
        )));
    }

    Ok((0..n_lanes)
        .map(|lane| acts.iter().map(|a| a.row(lane).to_vec()).collect())
        .collect())
}

/// Stacks per-lane observations into one batch per agent slot.
pub(crate) fn stack_obs(lanes: &[Vec<Vec<f32>>], n_agents: usize) -> Result<Vec<ObsBatch>> {
    (0..n_agents)
        .map(|agent| {
            let dim = lanes.first().map(|o| o[agent].len()).unwrap_or(0);
            let flat: Vec<f32> = lanes.iter().flat_map(|o| o[agent].iter().copied()).collect();
            Ok(Array2::from_shape_vec((lanes.len(), dim), flat)?)
        })
        .collect()
}

/// Assembles the outcomes of all lanes into a [`MultiStep`].
pub(crate) fn collect_steps(steps: Vec<LaneStep>, n_agents: usize) -> Result<MultiStep> {
    let obs_lanes: Vec<_> = steps.iter().map(|s| s.obs.clone()).collect();
    let obs = stack_obs(&obs_lanes, n_agents)?;
    let reward = (0..n_agents)
        .map(|agent| steps.iter().map(|s| s.reward[agent]).collect())
        .collect();
    let is_done = steps.iter().map(|s| s.is_done as i8).collect();
    let info = steps.into_iter().map(|s| s.info).collect();

    Ok(MultiStep {
        obs,
        reward,
        is_done,
        info,
    })
}

/// Checks that all lanes agree on the agent slots and returns their spaces.
pub(crate) fn lane_spaces<S: LaneSim>(sims: &[S]) -> Result<(Vec<BoxSpace>, Vec<BoxSpace>)> {
    let first = sims
        .first()
        .ok_or_else(|| LookbackError::config("A vectorized environment needs at least one lane"))?;
    let n_agents = first.num_agents();
    if sims.iter().any(|s| s.num_agents() != n_agents) {
        return Err(LookbackError::config("Lanes differ in the number of agents"));
    }
    let obs_spaces = (0..n_agents).map(|i| first.observation_space(i)).collect();
    let act_spaces = (0..n_agents).map(|i| first.action_space(i)).collect();
    Ok((obs_spaces, act_spaces))
}

/// Vectorized environment stepping its lanes sequentially in the caller's thread.
///
/// Useful for debugging and for cheap simulators, where the overhead of
/// [`ThreadedVecMultiEnv`](super::ThreadedVecMultiEnv) does not pay off.
pub struct DummyVecMultiEnv<S> {
    sims: Vec<S>,
    obs_spaces: Vec<BoxSpace>,
    act_spaces: Vec<BoxSpace>,
    pending: Option<Vec<Vec<Vec<f32>>>>,
}

impl<S: LaneSim> DummyVecMultiEnv<S> {
    /// Constructs a vectorized environment with one lane per simulator.
    pub fn new(sims: Vec<S>) -> Result<Self> {
        let (obs_spaces, act_spaces) = lane_spaces(&sims)?;
        Ok(Self {
            sims,
            obs_spaces,
            act_spaces,
            pending: None,
        })
    }

    fn sim(&self, lane: usize) -> Result<&S> {
        let num_lanes = self.sims.len();
        self.sims
            .get(lane)
            .ok_or_else(|| LookbackError::LaneOutOfRange { lane, num_lanes }.into())
    }

    fn sim_mut(&mut self, lane: usize) -> Result<&mut S> {
        let num_lanes = self.sims.len();
        self.sims
            .get_mut(lane)
            .ok_or_else(|| LookbackError::LaneOutOfRange { lane, num_lanes }.into())
    }
}

impl<S: LaneSim> MultiAgentVecEnv for DummyVecMultiEnv<S> {
    fn num_lanes(&self) -> usize {
        self.sims.len()
    }

    fn num_agents(&self) -> usize {
        self.obs_spaces.len()
    }

    fn observation_space(&self, agent: usize) -> &BoxSpace {
        &self.obs_spaces[agent]
    }

    fn action_space(&self, agent: usize) -> &BoxSpace {
        &self.act_spaces[agent]
    }

    fn reset(&mut self) -> Result<Vec<ObsBatch>> {
        trace!("DummyVecMultiEnv::reset()");
        self.pending = None;
        let obs: Vec<_> = self.sims.iter_mut().map(|s| s.reset()).collect();
        stack_obs(&obs, self.num_agents())
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        self.pending = Some(lane_actions(&acts, self.num_agents(), self.num_lanes())?);
        Ok(())
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        let acts = self.pending.take().ok_or(LookbackError::NoPendingStep)?;
        let steps = self
            .sims
            .iter_mut()
            .zip(acts.iter())
            .map(|(s, a)| step_with_reset(s, a))
            .collect();
        collect_steps(steps, self.num_agents())
    }
}

impl<S: LaneSim> Simulator for DummyVecMultiEnv<S> {
    fn get_state(&self, lane: usize) -> Result<SimState> {
        Ok(self.sim(lane)?.get_state())
    }

    fn set_state(
        &mut self,
        lane: usize,
        state: &SimState,
        full: Option<&FullSimState>,
        forward: bool,
    ) -> Result<()> {
        self.sim_mut(lane)?.set_state(state, full, forward)
    }

    fn get_full_state(&self, lane: usize) -> Result<FullSimState> {
        Ok(self.sim(lane)?.get_full_state())
    }

    fn get_radius(&self, lane: usize) -> Result<f32> {
        Ok(self.sim(lane)?.radius())
    }

    fn set_radius(&mut self, lane: usize, radius: f32) -> Result<()> {
        self.sim_mut(lane)?.set_radius(radius);
        Ok(())
    }
}

impl<S: LaneSim> Pipeline for DummyVecMultiEnv<S> {
    fn simulator(&mut self) -> &mut dyn Simulator {
        self
    }
}
