//! Lookback reward augmentation.
mod bonus;
mod config;
mod pool;
pub use bonus::lookback_bonus;
pub use config::{BonusNormalization, LookbackConfig};
pub use pool::{ShadowPool, ShadowSlot};

use anyhow::Result;
use log::{debug, info, trace};
use lookback_core::{
    error::LookbackError,
    record::{BufferedRecorder, Record, RecordStorage, Recorder},
    ActBatch, BoxSpace, Curried, FullSimState, ObsBatch, Pipeline, Policy, RecurrentState,
    SimState, Simulator, Step, VecEnv,
};
use pool::{truncate, SlotData};

fn curried_of<E: Pipeline + ?Sized>(venv: &mut E) -> Result<&mut dyn Curried> {
    venv.curried()
        .ok_or_else(|| LookbackError::config("Lookback requires a pipeline with an embedded victim"))
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Adds to the learner's reward a bonus measuring how much the victim's
/// internal signals differ from those in shadow worlds where the learner
/// acted according to its own policy.
///
/// The live pipeline and every shadow pipeline embed a transparent victim.
/// The shadow pool holds `K + 1` shadow pipelines of the same number of lanes
/// as the live one. A slot at offset `i` was synchronized with the live world
/// `i` steps ago; since then the learner has acted in it by its policy, with
/// its own recurrent state, instead of the actions given to this environment.
///
/// # Step
///
/// `step_async`:
///
/// 1. Snapshot the physical state and the radius of every live lane, and the
///    victim's observation, recurrent state and done mask.
/// 2. Rotate the pool; the oldest slot becomes the new baseline at offset 0.
/// 3. Overwrite the baseline's victim context, radii and physical states
///    with the snapshot, without recomputing derived data.
/// 4. Step every other slot with its cached action.
/// 5. Step the baseline with the action the learner's policy chose for the
///    current live observation; its recurrent state becomes a copy of the
///    state that produced this action.
/// 6. Step the live pipeline with the given action.
/// 7. Increment the episode length of every lane.
///
/// `step_wait` collects the live step, computes the learner's next action
/// for the live world and for every slot, restarts the lineages of lanes whose
/// live episode ended and adds the bonus to the live reward.
///
/// ```mermaid
/// graph LR
///     L[Live pipeline] -->|state, radius, victim obs| B[Slot 0: baseline]
///     B -->|rotate| S1[Slot 1]
///     S1 -->|rotate| S2[Slot ...]
///     S2 -->|rotate| SK[Slot K]
///     SK -->|oldest becomes baseline| B
///     L -->|victim signals| D{L2 distance}
///     B -->|victim signals| D
///     S1 -->|victim signals| D
///     SK -->|victim signals| D
///     D -->|bonus| R[Reward]
/// ```
///
/// A lane with episode length `L` only takes slots at offsets below `L` into
/// account, since older slots were synchronized before the episode began.
///
/// When `debug` is set in [`LookbackConfig`], the trace of the live pipeline
/// is kept in [`LookbackRewardVecEnv::trace`]`(0)` and that of the slot at
/// offset `j` in `trace(j + 1)`.
pub struct LookbackRewardVecEnv<E, S, P> {
    venv: E,
    pool: ShadowPool<S>,
    policy: P,
    config: LookbackConfig,
    obs: Option<ObsBatch>,
    own_action: Option<ActBatch>,
    own_state: Option<RecurrentState>,
    dones: Vec<i8>,
    ep_lens: Vec<usize>,
    traces: Vec<BufferedRecorder>,
    bonus_stats: RecordStorage,
}

impl<E, S, P> LookbackRewardVecEnv<E, S, P>
where
    E: VecEnv + Pipeline,
    S: VecEnv + Pipeline,
    P: Policy,
{
    /// Wraps the live pipeline `venv`.
    ///
    /// `make_shadow` builds the shadow pipeline of slot `i` for `i` in `0..=K`.
    /// Fails with a configuration error if a pipeline lacks a transparent
    /// embedded victim, if a shadow pipeline differs from the live one in
    /// lanes or action space, or if `policy` does not fit the pipelines.
    pub fn new(
        mut venv: E,
        policy: P,
        config: LookbackConfig,
        mut make_shadow: impl FnMut(usize) -> Result<S>,
    ) -> Result<Self> {
        if !curried_of(&mut venv)?.is_transparent() {
            return Err(LookbackError::config(
                "Lookback requires a transparent victim in the live pipeline",
            ));
        }
        if policy.action_space() != venv.action_space() {
            return Err(LookbackError::config(
                "Action space of the policy does not match that of the environment",
            ));
        }
        if policy.observation_space().dim() > venv.observation_space().dim() {
            return Err(LookbackError::config(format!(
                "Policy observes {} features, the environment provides {}",
                policy.observation_space().dim(),
                venv.observation_space().dim()
            )));
        }

        let n_lanes = venv.num_lanes();
        let shadows = (0..=config.lookback_num)
            .map(|i| {
                let mut shadow = make_shadow(i)?;
                if shadow.num_lanes() != n_lanes {
                    return Err(LookbackError::config(format!(
                        "Shadow pipeline {} has {} lanes, the live one {}",
                        i,
                        shadow.num_lanes(),
                        n_lanes
                    )));
                }
                if shadow.action_space() != venv.action_space() {
                    return Err(LookbackError::config(format!(
                        "Action space of shadow pipeline {} differs from the live one",
                        i
                    )));
                }
                if !curried_of(&mut shadow)?.is_transparent() {
                    return Err(LookbackError::config(format!(
                        "Lookback requires a transparent victim in shadow pipeline {}",
                        i
                    )));
                }
                Ok(shadow)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Lookback over {} lanes with {} shadow slots, bonus_coef = {}",
            n_lanes,
            shadows.len(),
            config.bonus_coef
        );

        let traces = match config.debug {
            true => (0..shadows.len() + 1).map(|_| BufferedRecorder::new()).collect(),
            false => vec![],
        };

        Ok(Self {
            venv,
            pool: ShadowPool::new(shadows),
            policy,
            config,
            obs: None,
            own_action: None,
            own_state: None,
            dones: vec![0; n_lanes],
            ep_lens: vec![0; n_lanes],
            traces,
            bonus_stats: RecordStorage::new(),
        })
    }

    /// The shadow pool.
    pub fn pool(&self) -> &ShadowPool<S> {
        &self.pool
    }

    /// Episode length of every lane.
    pub fn ep_lens(&self) -> &[usize] {
        &self.ep_lens
    }

    /// The learner's policy.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Action the learner's policy chose for the current live observation.
    pub fn predicted_action(&self) -> Option<&ActBatch> {
        self.own_action.as_ref()
    }

    /// Recurrent state that produced [`LookbackRewardVecEnv::predicted_action`].
    pub fn own_state(&self) -> Option<&RecurrentState> {
        self.own_state.as_ref()
    }

    /// Physical state of a live lane.
    pub fn live_state(&mut self, lane: usize) -> Result<SimState> {
        self.venv.simulator().get_state(lane)
    }

    /// Physical state of a lane in the slot at `offset`.
    pub fn shadow_state(&mut self, offset: usize, lane: usize) -> Result<SimState> {
        let num_slots = self.pool.len();
        let slot = self.pool.get_mut(offset).ok_or_else(|| {
            LookbackError::config(format!("Offset {} out of {} slots", offset, num_slots))
        })?;
        slot.venv.simulator().get_state(lane)
    }

    /// Debug trace of the live pipeline (`index == 0`) or of the slot at offset `index - 1`.
    pub fn trace(&self, index: usize) -> Option<&BufferedRecorder> {
        self.traces.get(index)
    }

    /// Aggregated statistics of the bonuses since the last call.
    pub fn flush_stats(&mut self) -> Record {
        self.bonus_stats.aggregate()
    }

    fn obs_dim(&self) -> usize {
        self.policy.observation_space().dim()
    }

    fn live_curry_obs(&mut self) -> Result<ObsBatch> {
        curried_of(&mut self.venv)?
            .get_obs()
            .ok_or_else(|| LookbackError::NotReset.into())
    }

    /// Computes the learner's next action in the live world.
    fn process_own_obs(&mut self, obs: &ObsBatch) -> Result<()> {
        let obs = truncate(obs, self.obs_dim());
        let pred = self
            .policy
            .predict(&obs, self.own_state.as_ref(), &self.dones)?;
        self.own_action = Some(pred.act);
        self.own_state = pred.state;
        self.obs = Some(obs);
        Ok(())
    }

    /// Computes the learner's next action in every slot and caches the victim info.
    fn process_lb_data(&mut self, lb_steps: Vec<Step>) -> Result<()> {
        let dim = self.obs_dim();
        for (offset, (slot, step)) in self.pool.iter_mut().zip(lb_steps).enumerate() {
            let obs = truncate(&step.obs, dim);
            let pred = self
                .policy
                .predict(&obs, slot.data.state.as_ref(), &self.dones)?;
            slot.data.action = Some(pred.act);
            slot.data.state = pred.state;
            slot.data.reward = step.reward;
            slot.data.victim_info = curried_of(&mut slot.venv)?.curried_info().to_vec();

            if let Some(trace) = slot.venv.take_trace() {
                if let Some(recorder) = self.traces.get_mut(offset + 1) {
                    recorder.write(trace);
                }
            }
        }
        Ok(())
    }

    /// Restarts the shadow lineages from the live world, for every lane or a single lane.
    ///
    /// Every fallible read happens before the first write.
    fn reset_state_data(&mut self, obs: &ObsBatch, lane: Option<usize>) -> Result<()> {
        let n_lanes = self.venv.num_lanes();
        let lanes: Vec<usize> = match lane {
            Some(l) => vec![l],
            None => (0..n_lanes).collect(),
        };
        let curry_obs = self.live_curry_obs()?;
        let sim = self.venv.simulator();
        let snapshots = lanes
            .iter()
            .map(|l| Ok((*l, sim.get_full_state(*l)?, sim.get_radius(*l)?)))
            .collect::<Result<Vec<(usize, FullSimState, f32)>>>()?;
        let obs = truncate(obs, self.obs_dim());
        let pred = self.policy.predict(&obs, None, &vec![0; n_lanes])?;

        for slot in self.pool.iter_mut() {
            match lane {
                None => {
                    slot.venv.reset()?;
                    slot.data = SlotData::fresh(&pred, n_lanes);
                }
                Some(l) => {
                    slot.data.reset_lane(l, &pred);
                    curried_of(&mut slot.venv)?.reset_lane(l);
                }
            }
            curried_of(&mut slot.venv)?.set_obs(&curry_obs, lane)?;
            let sim = slot.venv.simulator();
            for (l, full, radius) in snapshots.iter() {
                sim.set_radius(*l, *radius)?;
                sim.set_state(*l, &full.state, Some(full), false)?;
            }
        }
        trace!("Restarted shadow lineages of lanes {:?}", lanes);
        Ok(())
    }
}

impl<E, S, P> VecEnv for LookbackRewardVecEnv<E, S, P>
where
    E: VecEnv + Pipeline,
    S: VecEnv + Pipeline,
    P: Policy,
{
    fn num_lanes(&self) -> usize {
        self.venv.num_lanes()
    }

    fn observation_space(&self) -> &BoxSpace {
        self.venv.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<ObsBatch> {
        let obs = self.venv.reset()?;
        let n_lanes = self.num_lanes();
        self.dones = vec![0; n_lanes];
        self.ep_lens = vec![0; n_lanes];
        self.own_state = None;
        self.process_own_obs(&obs)?;
        self.reset_state_data(&obs, None)?;
        let _ = self.venv.take_trace();
        for slot in self.pool.iter_mut() {
            let _ = slot.venv.take_trace();
        }
        Ok(obs)
    }

    fn step_async(&mut self, act: ActBatch) -> Result<()> {
        if self.obs.is_none() {
            return Err(LookbackError::NotReset.into());
        }
        let n_lanes = self.num_lanes();

        let curry_obs = self.live_curry_obs()?;
        let live_curry = curried_of(&mut self.venv)?;
        let victim_state = live_curry.policy_state().cloned();
        let victim_dones = live_curry.dones().to_vec();
        let sim = self.venv.simulator();
        let snapshots = (0..n_lanes)
            .map(|l| Ok((sim.get_state(l)?, sim.get_radius(l)?)))
            .collect::<Result<Vec<(SimState, f32)>>>()?;

        self.pool.rotate();

        let baseline = self
            .pool
            .get_mut(0)
            .ok_or_else(|| LookbackError::config("Empty shadow pool"))?;
        let baseline_curry = curried_of(&mut baseline.venv)?;
        baseline_curry.set_obs(&curry_obs, None)?;
        baseline_curry.set_policy_state(victim_state.as_ref(), &victim_dones)?;
        let sim = baseline.venv.simulator();
        for (lane, (state, radius)) in snapshots.iter().enumerate() {
            sim.set_radius(lane, *radius)?;
            sim.set_state(lane, state, None, false)?;
        }

        for slot in self.pool.iter_mut().skip(1) {
            let act = slot.data.action.clone().ok_or(LookbackError::NotReset)?;
            slot.venv.step_async(act)?;
        }

        let own_action = self.own_action.clone().ok_or(LookbackError::NotReset)?;
        if let Some(baseline) = self.pool.get_mut(0) {
            baseline.data.state = self.own_state.clone();
            baseline.venv.step_async(own_action)?;
        }

        self.venv.step_async(act)?;

        for l in self.ep_lens.iter_mut() {
            *l += 1;
        }
        Ok(())
    }

    fn step_wait(&mut self) -> Result<Step> {
        let mut step = self.venv.step_wait()?;
        self.dones = step.is_done.clone();
        self.process_own_obs(&step.obs)?;

        let lb_steps = self
            .pool
            .iter_mut()
            .map(|slot| slot.venv.step_wait())
            .collect::<Result<Vec<_>>>()?;
        self.process_lb_data(lb_steps)?;

        if let Some(trace) = self.venv.take_trace() {
            if let Some(recorder) = self.traces.get_mut(0) {
                recorder.write(trace);
            }
        }

        let live_info = curried_of(&mut self.venv)?.curried_info().to_vec();
        for lane in 0..self.num_lanes() {
            if step.is_done(lane) {
                self.ep_lens[lane] = 0;
                self.reset_state_data(&step.obs, Some(lane))?;
            }

            let shadows = self.pool.iter().map(|slot| &slot.data.victim_info[lane]);
            let bonus = lookback_bonus(&live_info[lane], shadows, self.ep_lens[lane], &self.config)?;
            debug!(
                "lane = {}, ep_len = {}, reward = {}, bonus = {}",
                lane, self.ep_lens[lane], step.reward[lane], bonus
            );
            self.bonus_stats
                .store(Record::from_scalar("lookback_bonus", bonus));
            step.reward[lane] += bonus;
        }

        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        for slot in self.pool.iter_mut() {
            slot.venv.close()?;
        }
        self.venv.close()
    }
}

impl<E, S, P> Pipeline for LookbackRewardVecEnv<E, S, P>
where
    E: VecEnv + Pipeline,
    S: VecEnv + Pipeline,
    P: Policy,
{
    fn simulator(&mut self) -> &mut dyn Simulator {
        self.venv.simulator()
    }

    fn curried(&mut self) -> Option<&mut dyn Curried> {
        self.venv.curried()
    }
}
