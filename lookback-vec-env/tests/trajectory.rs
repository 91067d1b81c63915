mod common;
use anyhow::Result;
use common::*;
use lookback_core::{
    error::LookbackError,
    record::{Record, RecordValue},
    util::simulate,
    ActBatch, BoxSpace, MultiAgentVecEnv, MultiStep, ObsBatch, Policy,
};
use lookback_policy_no_backend::RandomPolicy;
use lookback_vec_env::{AgentTrajectories, ArenaConfig, EnvKey, TrajectoryRecorder, TrajectoryRecorderConfig};
use ndarray::{arr2, Array2};
use tempdir::TempDir;
use test_log::test;

/// One lane, two agents, episodes of three steps. Agent 0 is rewarded
/// `1, 2, 3` and agent 1 `-1, -2, -3`; observations count the steps.
struct ScriptedVecEnv {
    space: BoxSpace,
    t: usize,
    pending: Option<Vec<ActBatch>>,
}

impl ScriptedVecEnv {
    fn new() -> Self {
        Self {
            space: BoxSpace::uniform(1, -10.0, 10.0),
            t: 0,
            pending: None,
        }
    }

    fn obs(&self) -> Vec<ObsBatch> {
        vec![Array2::from_elem((1, 1), self.t as f32); 2]
    }
}

impl MultiAgentVecEnv for ScriptedVecEnv {
    fn num_lanes(&self) -> usize {
        1
    }

    fn num_agents(&self) -> usize {
        2
    }

    fn observation_space(&self, _agent: usize) -> &BoxSpace {
        &self.space
    }

    fn action_space(&self, _agent: usize) -> &BoxSpace {
        &self.space
    }

    fn reset(&mut self) -> Result<Vec<ObsBatch>> {
        self.t = 0;
        Ok(self.obs())
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        self.pending = Some(acts);
        Ok(())
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        self.pending.take().ok_or(LookbackError::NoPendingStep)?;
        self.t += 1;
        let r = self.t as f32;
        let is_done = self.t == 3;
        let info = vec![
            Record::from_slice(&[("score", RecordValue::Scalar(10.0 * r))]),
            Record::empty(),
        ];
        if is_done {
            self.t = 0;
        }
        Ok(MultiStep {
            obs: self.obs(),
            reward: vec![vec![r], vec![-r]],
            is_done: vec![is_done as i8],
            info: vec![info],
        })
    }
}

#[test]
fn test_record_save_and_load() -> Result<()> {
    let config = TrajectoryRecorderConfig::default()
        .agent_indices(vec![0])
        .info_keys(Some(vec!["score".to_string(), "missing".to_string()]));
    let mut venv = TrajectoryRecorder::new(ScriptedVecEnv::new(), config)?;

    venv.reset()?;
    for t in 0..7 {
        let a = Array2::from_elem((1, 1), t as f32 * 0.5);
        venv.step(vec![a.clone(), -a])?;
    }

    let traj = venv.trajectories(0).unwrap();
    assert_eq!(traj.n_episodes(), 2);
    assert!(venv.trajectories(1).is_none());
    assert!(venv.missing_keys().contains("missing"));
    assert!(!venv.missing_keys().contains("score"));

    let dir = TempDir::new("trajectory_recorder")?;
    venv.save(dir.path())?;
    assert!(!dir.path().join("agent_1.bin").exists());
    let loaded = AgentTrajectories::load(dir.path().join("agent_0.bin"))?;
    assert_eq!(&loaded, traj);

    assert_eq!(loaded.episode_returns(), vec![6.0, 6.0]);
    let rewards = loaded.episodes(EnvKey::Rewards.as_str()).unwrap();
    assert_eq!(rewards[0], arr2(&[[1.0], [2.0], [3.0]]));
    let obs = loaded.episodes(EnvKey::Observations.as_str()).unwrap();
    assert_eq!(obs[1], arr2(&[[0.0], [1.0], [2.0]]));
    let acts = loaded.episodes(EnvKey::Actions.as_str()).unwrap();
    assert_eq!(acts[1], arr2(&[[1.5], [2.0], [2.5]]));
    let score = loaded.episodes("score").unwrap();
    assert_eq!(score[0], arr2(&[[10.0], [20.0], [30.0]]));
    Ok(())
}

#[test]
fn test_record_all_agents_and_info() -> Result<()> {
    let config = TrajectoryRecorderConfig::default()
        .env_keys(vec![EnvKey::Rewards])
        .info_keys(None);
    let mut venv = TrajectoryRecorder::new(ScriptedVecEnv::new(), config)?;
    venv.reset()?;
    for _ in 0..3 {
        venv.step(vec![Array2::zeros((1, 1)); 2])?;
    }
    assert_eq!(venv.agent_indices(), &[0, 1]);
    assert_eq!(venv.trajectories(1).unwrap().episode_returns(), vec![-6.0]);
    assert!(venv.trajectories(0).unwrap().episodes("score").is_some());
    assert!(venv.trajectories(0).unwrap().episodes("observations").is_none());
    assert!(venv.missing_keys().is_empty());
    Ok(())
}

#[test]
fn test_rejects_unknown_agent() {
    let config = TrajectoryRecorderConfig::default().agent_indices(vec![2]);
    assert_config_error(TrajectoryRecorder::new(ScriptedVecEnv::new(), config));
}

#[test]
fn test_record_arena_rollout() -> Result<()> {
    let arena = ArenaConfig::default().max_steps(5);
    let config = TrajectoryRecorderConfig::default().info_keys(Some(vec!["contact".to_string()]));
    let mut venv = TrajectoryRecorder::new(multi(&arena, 2, 0, true)?, config)?;
    let mut policies: Vec<Box<dyn Policy>> = vec![
        Box::new(RandomPolicy::new(obs_space(OBS_DIM), act_space(), 1)),
        Box::new(RandomPolicy::new(obs_space(OBS_DIM), act_space(), 2)),
    ];

    simulate(&mut venv, &mut policies, 10, |_, _| Ok(()))?;

    for agent in 0..2 {
        let traj = venv.trajectories(agent).unwrap();
        assert_eq!(traj.n_episodes(), 4);
        for obs in traj.episodes("observations").unwrap() {
            assert_eq!(obs.shape(), &[5, OBS_DIM]);
        }
        for acts in traj.episodes("actions").unwrap() {
            assert_eq!(acts.shape(), &[5, 2]);
        }
        assert_eq!(traj.episodes("contact").unwrap().len(), 4);
    }
    Ok(())
}
