//! Recording complete episodes of selected agents.
use anyhow::Result;
use itertools::iproduct;
use log::{info, warn};
use lookback_core::{
    error::LookbackError, record::Record, ActBatch, BoxSpace, Curried, MultiAgentVecEnv, MultiStep,
    ObsBatch, Pipeline, Simulator,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Key of the per-episode array holding the undiscounted return.
pub const EPISODE_RETURNS: &str = "episode_returns";

/// Step data taken from the environment itself.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum EnvKey {
    /// Observation the action was taken on.
    Observations,

    /// Action taken.
    Actions,

    /// Reward received.
    Rewards,
}

impl EnvKey {
    /// Name of the field in [`AgentTrajectories`].
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::Observations => "observations",
            EnvKey::Actions => "actions",
            EnvKey::Rewards => "rewards",
        }
    }
}

/// Configuration of [`TrajectoryRecorder`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TrajectoryRecorderConfig {
    /// Agent slots to record. All slots if `None`.
    pub agent_indices: Option<Vec<usize>>,

    /// Environment data to record.
    pub env_keys: Vec<EnvKey>,

    /// Info keys to record. All entries if `None`.
    pub info_keys: Option<Vec<String>>,
}

impl Default for TrajectoryRecorderConfig {
    fn default() -> Self {
        Self {
            agent_indices: None,
            env_keys: vec![EnvKey::Observations, EnvKey::Actions, EnvKey::Rewards],
            info_keys: Some(vec![]),
        }
    }
}

impl TrajectoryRecorderConfig {
    /// Sets the agent slots to record.
    pub fn agent_indices(mut self, v: Vec<usize>) -> Self {
        self.agent_indices = Some(v);
        self
    }

    /// Sets the environment data to record.
    pub fn env_keys(mut self, v: Vec<EnvKey>) -> Self {
        self.env_keys = v;
        self
    }

    /// Sets the info keys to record.
    pub fn info_keys(mut self, v: Option<Vec<String>>) -> Self {
        self.info_keys = v;
        self
    }

    /// Constructs [`TrajectoryRecorderConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrajectoryRecorderConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Completed episodes of one agent slot.
///
/// Each field holds one array per episode of shape `(steps, dim)`; rewards and
/// scalar info entries have `dim == 1`. [`EPISODE_RETURNS`] holds a `(1, 1)`
/// array per episode.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AgentTrajectories {
    /// Field name to per-episode arrays.
    pub fields: BTreeMap<String, Vec<Array2<f32>>>,
}

impl AgentTrajectories {
    /// Per-episode arrays of a field.
    pub fn episodes(&self, key: &str) -> Option<&[Array2<f32>]> {
        self.fields.get(key).map(|v| v.as_slice())
    }

    /// The number of completed episodes.
    pub fn n_episodes(&self) -> usize {
        self.fields.get(EPISODE_RETURNS).map(|v| v.len()).unwrap_or(0)
    }

    /// Undiscounted return of each episode.
    pub fn episode_returns(&self) -> Vec<f32> {
        self.fields
            .get(EPISODE_RETURNS)
            .map(|v| v.iter().map(|a| a[[0, 0]]).collect())
            .unwrap_or_default()
    }

    /// Writes the trajectories to a binary file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let wtr = BufWriter::new(File::create(path)?);
        bincode::serialize_into(wtr, self)?;
        Ok(())
    }

    /// Reads trajectories written by [`AgentTrajectories::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(rdr)?)
    }

    /// Appends an episode to every field.
    ///
    /// A field absent from the episode, or whose rows vary in width, gets an
    /// empty `(0, 0)` array, so that index `e` of every field is episode `e`.
    fn push_episode(&mut self, episode: EpisodeBuffer) -> Result<()> {
        let n_prev = self.n_episodes();
        let mut fields = episode.fields;
        fields.insert(EPISODE_RETURNS.to_string(), vec![vec![episode.ret]]);
        let keys: BTreeSet<String> = self.fields.keys().chain(fields.keys()).cloned().collect();

        for key in keys {
            let array = match fields.remove(&key) {
                Some(rows) => stack_rows(&key, rows)?,
                None => Array2::zeros((0, 0)),
            };
            self.fields
                .entry(key)
                .or_insert_with(|| vec![Array2::zeros((0, 0)); n_prev])
                .push(array);
        }
        Ok(())
    }
}

fn stack_rows(key: &str, rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != width) {
        warn!("Field {} has rows of varying width, stored as empty", key);
        return Ok(Array2::zeros((0, 0)));
    }
    Ok(Array2::from_shape_vec((rows.len(), width), rows.concat())?)
}

#[derive(Default)]
struct EpisodeBuffer {
    fields: BTreeMap<String, Vec<Vec<f32>>>,
    ret: f32,
}

/// Records the episodes of selected agent slots of a multi-agent environment.
///
/// Steps are buffered per lane and moved to the agent's [`AgentTrajectories`]
/// when the lane's episode ends. Episodes unfinished when the recorder is
/// saved are not written.
pub struct TrajectoryRecorder<E> {
    venv: E,
    agent_indices: Vec<usize>,
    env_keys: Vec<EnvKey>,
    info_keys: Option<Vec<String>>,
    buffers: Vec<Vec<EpisodeBuffer>>,
    trajectories: Vec<AgentTrajectories>,
    prev_obs: Option<Vec<ObsBatch>>,
    acts: Option<Vec<ActBatch>>,
    missing_keys: BTreeSet<String>,
}

impl<E: MultiAgentVecEnv> TrajectoryRecorder<E> {
    /// Wraps `venv`.
    pub fn new(venv: E, config: TrajectoryRecorderConfig) -> Result<Self> {
        let n_agents = venv.num_agents();
        let agent_indices = config
            .agent_indices
            .unwrap_or_else(|| (0..n_agents).collect());
        if let Some(i) = agent_indices.iter().find(|i| **i >= n_agents) {
            return Err(LookbackError::config(format!(
                "Cannot record agent {} of an environment with {} agents",
                i, n_agents
            )));
        }
        let n_lanes = venv.num_lanes();
        let buffers = agent_indices
            .iter()
            .map(|_| (0..n_lanes).map(|_| EpisodeBuffer::default()).collect())
            .collect();
        let trajectories = vec![AgentTrajectories::default(); agent_indices.len()];

        Ok(Self {
            venv,
            agent_indices,
            env_keys: config.env_keys,
            info_keys: config.info_keys,
            buffers,
            trajectories,
            prev_obs: None,
            acts: None,
            missing_keys: BTreeSet::new(),
        })
    }

    /// Recorded agent slots.
    pub fn agent_indices(&self) -> &[usize] {
        &self.agent_indices
    }

    /// Completed episodes of a recorded agent slot.
    pub fn trajectories(&self, agent: usize) -> Option<&AgentTrajectories> {
        self.agent_indices
            .iter()
            .position(|i| *i == agent)
            .map(|d| &self.trajectories[d])
    }

    /// Requested info keys that were absent from some step.
    pub fn missing_keys(&self) -> &BTreeSet<String> {
        &self.missing_keys
    }

    /// Writes the completed episodes of each recorded agent to `agent_{i}.bin` in `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        for (agent, traj) in self.agent_indices.iter().zip(self.trajectories.iter()) {
            let path = dir.join(format!("agent_{}.bin", agent));
            traj.save(&path)?;
            info!("Saved {} episodes of agent {} to {:?}", traj.n_episodes(), agent, path);
        }
        Ok(())
    }

    fn record_timestep(&mut self, step: &MultiStep) -> Result<()> {
        let acts = self.acts.take().ok_or(LookbackError::NoPendingStep)?;
        let Self {
            prev_obs,
            agent_indices,
            env_keys,
            info_keys,
            buffers,
            trajectories,
            missing_keys,
            ..
        } = self;
        let prev_obs = prev_obs.as_ref().ok_or(LookbackError::NotReset)?;

        for ((d, &agent), lane) in iproduct!(agent_indices.iter().enumerate(), 0..step.num_lanes()) {
            let buf = &mut buffers[d][lane];
            let reward = step.reward[agent][lane];
            for key in env_keys.iter() {
                let value = match key {
                    EnvKey::Observations => prev_obs[agent].row(lane).to_vec(),
                    EnvKey::Actions => acts[agent].row(lane).to_vec(),
                    EnvKey::Rewards => vec![reward],
                };
                buf.fields.entry(key.as_str().to_string()).or_default().push(value);
            }
            buf.ret += reward;

            let info = &step.info[lane][agent];
            match info_keys {
                None => {
                    for (k, v) in info.iter() {
                        buf.fields.entry(k.clone()).or_default().push(v.to_vec());
                    }
                }
                Some(keys) => {
                    for k in keys.iter() {
                        match info.get(k).map(|v| v.to_vec()) {
                            Some(v) => buf.fields.entry(k.clone()).or_default().push(v),
                            None => {
                                if missing_keys.insert(k.clone()) {
                                    warn!("Info key {} is missing from the step of agent {}", k, agent);
                                }
                            }
                        }
                    }
                }
            }

            if step.is_done(lane) {
                trajectories[d].push_episode(std::mem::take(buf))?;
            }
        }
        Ok(())
    }
}

impl<E: MultiAgentVecEnv> MultiAgentVecEnv for TrajectoryRecorder<E> {
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
        for buf in self.buffers.iter_mut().flatten() {
            *buf = EpisodeBuffer::default();
        }
        self.prev_obs = Some(obs.clone());
        Ok(obs)
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        self.acts = Some(acts.clone());
        self.venv.step_async(acts)
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        let step = self.venv.step_wait()?;
        self.record_timestep(&step)?;
        self.prev_obs = Some(step.obs.clone());
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }
}

impl<E: MultiAgentVecEnv + Pipeline> Pipeline for TrajectoryRecorder<E> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_trajectory_recorder_config() -> Result<()> {
        let config = TrajectoryRecorderConfig::default()
            .agent_indices(vec![1])
            .env_keys(vec![EnvKey::Rewards])
            .info_keys(Some(vec!["winner".to_string()]));
        let dir = TempDir::new("trajectory_recorder_config")?;
        let path = dir.path().join("trajectory_recorder_config.yaml");
        config.save(&path)?;
        assert_eq!(config, TrajectoryRecorderConfig::load(&path)?);
        Ok(())
    }

    #[test]
    fn test_push_episode() -> Result<()> {
        let mut traj = AgentTrajectories::default();
        let mut episode = EpisodeBuffer::default();
        episode.fields.insert("rewards".into(), vec![vec![1.0], vec![2.0]]);
        episode.fields.insert("observations".into(), vec![vec![0.0, 1.0], vec![2.0, 3.0]]);
        episode.fields.insert("ragged".into(), vec![vec![0.0], vec![1.0, 2.0]]);
        episode.ret = 3.0;
        traj.push_episode(episode)?;

        assert_eq!(traj.n_episodes(), 1);
        assert_eq!(traj.episode_returns(), vec![3.0]);
        assert_eq!(traj.episodes("observations").unwrap()[0].shape(), &[2, 2]);
        assert_eq!(traj.episodes("ragged").unwrap()[0].shape(), &[0, 0]);
        Ok(())
    }

    #[test]
    fn test_fields_stay_aligned_with_episodes() -> Result<()> {
        let mut traj = AgentTrajectories::default();
        let episode = |fields: &[(&str, Vec<Vec<f32>>)], ret| EpisodeBuffer {
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            ret,
        };
        traj.push_episode(episode(&[("rewards", vec![vec![1.0]])], 1.0))?;
        traj.push_episode(episode(
            &[("rewards", vec![vec![2.0], vec![3.0]]), ("score", vec![vec![0.0], vec![1.0, 2.0]])],
            5.0,
        ))?;
        traj.push_episode(episode(&[("score", vec![vec![4.0]])], 0.0))?;

        assert_eq!(traj.n_episodes(), 3);
        for key in ["rewards", "score", EPISODE_RETURNS] {
            assert_eq!(traj.episodes(key).unwrap().len(), 3);
        }
        let rewards = traj.episodes("rewards").unwrap();
        assert_eq!(rewards[1], ndarray::arr2(&[[2.0], [3.0]]));
        assert_eq!(rewards[2].shape(), &[0, 0]);
        let score = traj.episodes("score").unwrap();
        assert_eq!(score[0].shape(), &[0, 0]);
        assert_eq!(score[1].shape(), &[0, 0]);
        assert_eq!(score[2], ndarray::arr2(&[[4.0]]));
        assert_eq!(traj.episode_returns(), vec![1.0, 5.0, 0.0]);
        Ok(())
    }
}
