//! Tracing the data flowing through a multi-agent environment.
use anyhow::Result;
use lookback_core::{
    record::{Record, RecordValue},
    ActBatch, BoxSpace, Curried, MultiAgentVecEnv, MultiStep, ObsBatch, Pipeline, Simulator,
};

/// Records, for every step, the observations before and after the step,
/// the actions and the rewards of every agent slot.
///
/// Keys are `prev_obs/{agent}`, `actions/{agent}`, `next_obs/{agent}` and
/// `rewards/{agent}`; observations and actions are stored as `(lanes, dim)`
/// arrays, rewards as `(lanes, 1)` arrays. The trace of the last completed
/// step is returned by [`Pipeline::take_trace`].
pub struct DebugVecEnv<E> {
    venv: E,
    current: Record,
    last: Option<Record>,
}

impl<E: MultiAgentVecEnv> DebugVecEnv<E> {
    /// Wraps `venv`.
    pub fn new(venv: E) -> Self {
        Self {
            venv,
            current: Record::empty(),
            last: None,
        }
    }

    fn insert_obs(&mut self, key: &str, obs: &[ObsBatch]) {
        for (i, o) in obs.iter().enumerate() {
            self.current
                .insert(format!("{}/{}", key, i), RecordValue::from_array2(o));
        }
    }
}

impl<E: MultiAgentVecEnv> MultiAgentVecEnv for DebugVecEnv<E> {
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
        let obs = self.venv.reset()?;
        self.current = Record::empty();
        self.last = None;
        self.insert_obs("prev_obs", &obs);
        Ok(obs)
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        for (i, a) in acts.iter().enumerate() {
            self.current
                .insert(format!("actions/{}", i), RecordValue::from_array2(a));
        }
        self.venv.step_async(acts)
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        let step = self.venv.step_wait()?;
        self.insert_obs("next_obs", &step.obs);
        for (i, r) in step.reward.iter().enumerate() {
            self.current.insert(
                format!("rewards/{}", i),
                RecordValue::Array2(r.clone(), [r.len(), 1]),
            );
        }
        self.last = Some(std::mem::take(&mut self.current));
        self.insert_obs("prev_obs", &step.obs);
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}

impl<E: MultiAgentVecEnv + Pipeline> Pipeline for DebugVecEnv<E> {
    fn simulator(&mut self) -> &mut dyn Simulator {
        self.venv.simulator()
    }

    fn curried(&mut self) -> Option<&mut dyn Curried> {
        self.venv.curried()
    }

    fn take_trace(&mut self) -> Option<Record> {
        self.last.take()
    }
}
