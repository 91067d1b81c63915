//! A sumo-style arena of point-mass agents.
//!
//! Agents push each other inside a ring. An agent leaving the ring loses,
//! agents remaining inside win. The radius of the ring is randomized per
//! episode and is the domain-randomization parameter of the lane.
use crate::vec::{LaneSim, LaneStep};
use anyhow::Result;
use log::trace;
use lookback_core::{
    error::LookbackError,
    record::{Record, RecordValue},
    BoxSpace, FullSimState, SimState,
};
use serde::{Deserialize, Serialize};
use std::{
    f64::consts::PI,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`ArenaSim`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ArenaConfig {
    /// The number of agents.
    pub n_agents: usize,

    /// Range the ring radius is drawn from at reset.
    pub radius_range: [f32; 2],

    /// Radius of an agent's body.
    pub agent_size: f64,

    /// Force exerted by an action of unit magnitude.
    pub max_force: f64,

    /// Stiffness of the contact force between overlapping agents.
    pub contact_stiffness: f64,

    /// Velocity damping per step.
    pub damping: f64,

    /// Integration time step.
    pub dt: f64,

    /// Episode length limit.
    pub max_steps: usize,

    /// Penalty per step, scaled by the distance to the center relative to the radius.
    pub step_penalty: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            n_agents: 2,
            radius_range: [3.0, 5.0],
            agent_size: 0.5,
            max_force: 1.0,
            contact_stiffness: 5.0,
            damping: 0.95,
            dt: 0.1,
            max_steps: 200,
            step_penalty: 0.01,
        }
    }
}

impl ArenaConfig {
    /// Sets the number of agents.
    pub fn n_agents(mut self, v: usize) -> Self {
        self.n_agents = v;
        self
    }

    /// Sets the range of the ring radius.
    pub fn radius_range(mut self, low: f32, high: f32) -> Self {
        self.radius_range = [low, high];
        self
    }

    /// Sets the episode length limit.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the integration time step.
    pub fn dt(mut self, v: f64) -> Self {
        self.dt = v;
        self
    }

    /// Sets the velocity damping.
    pub fn damping(mut self, v: f64) -> Self {
        self.damping = v;
        self
    }

    /// Constructs [`ArenaConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ArenaConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A single arena lane.
///
/// The physical state is the planar position and velocity of every agent
/// together with the step counter. Contact depths are derived data, recomputed
/// from positions before and after each step.
///
/// The observation of agent `i` is its own position and velocity, the positions
/// of the other agents relative to its own, the ring radius and its contact depth.
/// Actions are planar forces in `[-1, 1]^2`.
pub struct ArenaSim {
    config: ArenaConfig,
    rng: fastrand::Rng,
    radius: f32,
    step_count: usize,
    qpos: Vec<f64>,
    qvel: Vec<f64>,
    contact: Vec<f64>,
}

impl ArenaSim {
    /// Constructs an arena lane. `seed` drives the randomization at reset only.
    pub fn new(config: ArenaConfig, seed: u64) -> Result<Self> {
        let [low, high] = config.radius_range;
        if config.n_agents == 0 {
            return Err(LookbackError::config("An arena needs at least one agent"));
        }
        if !(0.0 < low && low <= high) {
            return Err(LookbackError::config(format!(
                "Invalid radius range [{}, {}]",
                low, high
            )));
        }
        let n = config.n_agents;

        Ok(Self {
            rng: fastrand::Rng::with_seed(seed),
            radius: low,
            step_count: 0,
            qpos: vec![0.0; 2 * n],
            qvel: vec![0.0; 2 * n],
            contact: vec![0.0; n],
            config,
        })
    }

    /// Dimension of an agent's observation.
    pub fn obs_dim(&self) -> usize {
        4 + 2 * (self.config.n_agents - 1) + 2
    }

    fn dist_between(&self, i: usize, j: usize) -> (f64, f64, f64) {
        let dx = self.qpos[2 * i] - self.qpos[2 * j];
        let dy = self.qpos[2 * i + 1] - self.qpos[2 * j + 1];
        (dx, dy, dx.hypot(dy))
    }

    fn dist_to_center(&self, i: usize) -> f64 {
        self.qpos[2 * i].hypot(self.qpos[2 * i + 1])
    }

    /// Recomputes contact depths from positions.
    fn forward(&mut self) {
        let n = self.config.n_agents;
        let reach = 2.0 * self.config.agent_size;
        for i in 0..n {
            self.contact[i] = (0..n)
                .filter(|j| *j != i)
                .map(|j| (reach - self.dist_between(i, j).2).max(0.0))
                .sum();
        }
    }

    fn observe(&self) -> Vec<Vec<f32>> {
        let n = self.config.n_agents;
        (0..n)
            .map(|i| {
                let mut o = Vec::with_capacity(self.obs_dim());
                o.extend(self.qpos[2 * i..2 * i + 2].iter().map(|v| *v as f32));
                o.extend(self.qvel[2 * i..2 * i + 2].iter().map(|v| *v as f32));
                for j in (0..n).filter(|j| *j != i) {
                    let (dx, dy, _) = self.dist_between(j, i);
                    o.push(dx as f32);
                    o.push(dy as f32);
                }
                o.push(self.radius);
                o.push(self.contact[i] as f32);
                o
            })
            .collect()
    }

    fn forces(&self, acts: &[Vec<f32>]) -> Vec<f64> {
        let n = self.config.n_agents;
        let reach = 2.0 * self.config.agent_size;
        let mut force = vec![0.0; 2 * n];
        for i in 0..n {
            for d in 0..2 {
                let a = acts.get(i).and_then(|a| a.get(d)).copied().unwrap_or(0.0);
                force[2 * i + d] = a.clamp(-1.0, 1.0) as f64 * self.config.max_force;
            }
            for j in (0..n).filter(|j| *j != i) {
                let (dx, dy, dist) = self.dist_between(i, j);
                if dist < reach && dist > f64::EPSILON {
                    let push = self.config.contact_stiffness * (reach - dist) / dist;
                    force[2 * i] += push * dx;
                    force[2 * i + 1] += push * dy;
                }
            }
        }
        force
    }
}

impl LaneSim for ArenaSim {
    fn num_agents(&self) -> usize {
        self.config.n_agents
    }

    fn observation_space(&self, _agent: usize) -> BoxSpace {
        BoxSpace::uniform(self.obs_dim(), f32::NEG_INFINITY, f32::INFINITY)
    }

    fn action_space(&self, _agent: usize) -> BoxSpace {
        BoxSpace::uniform(2, -1.0, 1.0)
    }

    fn reset(&mut self) -> Vec<Vec<f32>> {
        let n = self.config.n_agents;
        let [low, high] = self.config.radius_range;
        self.radius = low + self.rng.f32() * (high - low);
        let start = 0.5 * self.radius as f64;
        let offset = self.rng.f64() * 2.0 * PI;
        for i in 0..n {
            let jitter = (self.rng.f64() - 0.5) * 0.2;
            let angle = offset + 2.0 * PI * i as f64 / n as f64 + jitter;
            self.qpos[2 * i] = start * angle.cos();
            self.qpos[2 * i + 1] = start * angle.sin();
        }
        self.qvel.iter_mut().for_each(|v| *v = 0.0);
        self.step_count = 0;
        self.forward();
        trace!("ArenaSim::reset(): radius = {}", self.radius);
        self.observe()
    }

    fn step(&mut self, acts: &[Vec<f32>]) -> LaneStep {
        let n = self.config.n_agents;
        self.forward();
        let force = self.forces(acts);
        for (v, f) in self.qvel.iter_mut().zip(force.iter()) {
            *v = *v * self.config.damping + f * self.config.dt;
        }
        for (p, v) in self.qpos.iter_mut().zip(self.qvel.iter()) {
            *p += v * self.config.dt;
        }
        self.step_count += 1;
        self.forward();

        let radius = self.radius as f64;
        let dists: Vec<f64> = (0..n).map(|i| self.dist_to_center(i)).collect();
        let out: Vec<bool> = dists.iter().map(|d| *d > radius).collect();
        let ring_out = out.iter().any(|o| *o);
        let is_done = ring_out || self.step_count >= self.config.max_steps;

        let reward = (0..n)
            .map(|i| match (ring_out, out[i]) {
                (true, true) => -1.0,
                (true, false) => 1.0,
                _ => -self.config.step_penalty * (dists[i] / radius) as f32,
            })
            .collect();

        let info = (0..n)
            .map(|i| {
                let mut r = Record::from_slice(&[
                    ("dist_to_center", RecordValue::Scalar(dists[i] as f32)),
                    ("contact", RecordValue::Scalar(self.contact[i] as f32)),
                ]);
                if is_done {
                    let winner = ring_out && !out[i];
                    r.insert("winner", RecordValue::Scalar(winner as i32 as f32));
                }
                r
            })
            .collect();

        LaneStep {
            obs: self.observe(),
            reward,
            is_done,
            info,
        }
    }

    fn get_state(&self) -> SimState {
        SimState {
            step_count: self.step_count,
            qpos: self.qpos.clone(),
            qvel: self.qvel.clone(),
        }
    }

    fn set_state(&mut self, state: &SimState, full: Option<&FullSimState>, forward: bool) -> Result<()> {
        let n = self.config.n_agents;
        if state.qpos.len() != 2 * n || state.qvel.len() != 2 * n {
            return Err(LookbackError::config(format!(
                "State of {} positions does not fit an arena of {} agents",
                state.qpos.len(),
                n
            )));
        }
        self.step_count = state.step_count;
        self.qpos.copy_from_slice(&state.qpos);
        self.qvel.copy_from_slice(&state.qvel);
        if let Some(full) = full {
            if full.aux.len() == n {
                self.contact.copy_from_slice(&full.aux);
            }
        }
        if forward {
            self.forward();
        }
        Ok(())
    }

    fn get_full_state(&self) -> FullSimState {
        FullSimState {
            state: self.get_state(),
            aux: self.contact.clone(),
        }
    }

    fn radius(&self) -> f32 {
        self.radius
    }

    fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn acts() -> Vec<Vec<f32>> {
        vec![vec![0.3, -0.7], vec![-1.0, 0.5]]
    }

    #[test]
    fn test_state_round_trip_is_transparent() -> Result<()> {
        let mut a = ArenaSim::new(ArenaConfig::default(), 3)?;
        let mut b = ArenaSim::new(ArenaConfig::default(), 3)?;
        a.reset();
        b.reset();
        for _ in 0..5 {
            a.step(&acts());
            b.step(&acts());
        }

        let state = b.get_state();
        b.set_state(&state, None, false)?;

        for _ in 0..10 {
            let sa = a.step(&acts());
            let sb = b.step(&acts());
            assert_eq!(sa.obs, sb.obs);
            assert_eq!(sa.reward, sb.reward);
            assert_eq!(sa.is_done, sb.is_done);
        }
        assert_eq!(a.get_full_state(), b.get_full_state());
        Ok(())
    }

    #[test]
    fn test_copied_state_and_radius_reproduce_steps() -> Result<()> {
        let mut a = ArenaSim::new(ArenaConfig::default(), 1)?;
        let mut b = ArenaSim::new(ArenaConfig::default(), 2)?;
        a.reset();
        b.reset();
        a.step(&acts());

        b.set_radius(a.radius());
        b.set_state(&a.get_state(), Some(&a.get_full_state()), false)?;
        let sa = a.step(&acts());
        let sb = b.step(&acts());
        assert_eq!(sa.obs, sb.obs);
        assert_eq!(sa.reward, sb.reward);
        Ok(())
    }

    #[test]
    fn test_ring_out_ends_episode() -> Result<()> {
        let mut sim = ArenaSim::new(ArenaConfig::default(), 0)?;
        sim.reset();
        let radius = sim.radius() as f64;
        let state = SimState {
            step_count: 0,
            qpos: vec![radius + 1.0, 0.0, 0.0, 0.0],
            qvel: vec![0.0; 4],
        };
        sim.set_state(&state, None, true)?;
        let step = sim.step(&[vec![0.0, 0.0], vec![0.0, 0.0]]);
        assert!(step.is_done);
        assert_eq!(step.reward, vec![-1.0, 1.0]);
        assert_eq!(step.info[1].get_scalar("winner")?, 1.0);
        assert_eq!(step.info[0].get_scalar("winner")?, 0.0);
        Ok(())
    }

    #[test]
    fn test_time_limit() -> Result<()> {
        let mut sim = ArenaSim::new(ArenaConfig::default().max_steps(3), 0)?;
        sim.reset();
        let zero = vec![vec![0.0, 0.0]; 2];
        assert!(!sim.step(&zero).is_done);
        assert!(!sim.step(&zero).is_done);
        assert!(sim.step(&zero).is_done);
        Ok(())
    }

    #[test]
    fn test_invalid_state_is_rejected() -> Result<()> {
        let mut sim = ArenaSim::new(ArenaConfig::default(), 0)?;
        let state = SimState {
            step_count: 0,
            qpos: vec![0.0; 3],
            qvel: vec![0.0; 4],
        };
        let err = sim.set_state(&state, None, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LookbackError>(),
            Some(LookbackError::ConfigurationError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_serde_arena_config() -> Result<()> {
        let config = ArenaConfig::default().n_agents(3).max_steps(50).radius_range(2.0, 2.5);
        let dir = TempDir::new("arena_config")?;
        let path = dir.path().join("arena_config.yaml");
        config.save(&path)?;
        assert_eq!(config, ArenaConfig::load(&path)?);
        Ok(())
    }
}
