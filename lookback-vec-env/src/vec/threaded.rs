//! Vectorized environment with one worker thread per lane.
use super::base::{collect_steps, lane_actions, lane_spaces, stack_obs, step_with_reset, LaneSim, LaneStep};
use anyhow::{bail, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, trace};
use lookback_core::{
    error::LookbackError, ActBatch, BoxSpace, FullSimState, MultiAgentVecEnv, MultiStep, ObsBatch,
    Pipeline, SimState, Simulator,
};
use std::thread::{self, JoinHandle};

enum Command {
    Reset,
    Step(Vec<Vec<f32>>),
    GetState,
    SetState(SimState, Option<FullSimState>, bool),
    GetFullState,
    GetRadius,
    SetRadius(f32),
    Close,
}

enum Response {
    Obs(Vec<Vec<f32>>),
    Step(LaneStep),
    State(SimState),
    FullState(FullSimState),
    Radius(f32),
    Ok,
    Err(String),
}

struct Worker {
    cmd: Sender<Command>,
    resp: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

// Parameters drop in reverse order: `cmd` goes before `resp`, so a lane
// whose responses are disconnected also refuses new commands.
fn run_worker<S: LaneSim>(mut sim: S, resp: Sender<Response>, cmd: Receiver<Command>) {
    while let Ok(c) = cmd.recv() {
        let r = match c {
            Command::Reset => Response::Obs(sim.reset()),
            Command::Step(acts) => Response::Step(step_with_reset(&mut sim, &acts)),
            Command::GetState => Response::State(sim.get_state()),
            Command::SetState(state, full, forward) => {
                match sim.set_state(&state, full.as_ref(), forward) {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Err(e.to_string()),
                }
            }
            Command::GetFullState => Response::FullState(sim.get_full_state()),
            Command::GetRadius => Response::Radius(sim.radius()),
            Command::SetRadius(radius) => {
                sim.set_radius(radius);
                Response::Ok
            }
            Command::Close => break,
        };
        if resp.send(r).is_err() {
            break;
        }
    }
}

/// Vectorized environment running each lane in a dedicated worker thread.
///
/// `step_async` dispatches the actions to the workers and returns at once;
/// `step_wait` collects the results. State access commands are served by the
/// worker of the lane and may be issued only while no step is in flight.
pub struct ThreadedVecMultiEnv {
    workers: Vec<Worker>,
    obs_spaces: Vec<BoxSpace>,
    act_spaces: Vec<BoxSpace>,
    waiting: bool,
}

impl ThreadedVecMultiEnv {
    /// Spawns one worker per simulator.
    pub fn new<S: LaneSim + Send + 'static>(sims: Vec<S>) -> Result<Self> {
        let (obs_spaces, act_spaces) = lane_spaces(&sims)?;
        let n_lanes = sims.len();
        let workers = sims
            .into_iter()
            .enumerate()
            .map(|(lane, sim)| {
                let (cmd_s, cmd_r) = unbounded();
                let (resp_s, resp_r) = unbounded();
                let handle = thread::Builder::new()
                    .name(format!("lane-{}", lane))
                    .spawn(move || run_worker(sim, resp_s, cmd_r))?;
                Ok(Worker {
                    cmd: cmd_s,
                    resp: resp_r,
                    handle: Some(handle),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Spawned {} lane workers", n_lanes);

        Ok(Self {
            workers,
            obs_spaces,
            act_spaces,
            waiting: false,
        })
    }

    fn send(&self, lane: usize, cmd: Command) -> Result<()> {
        let num_lanes = self.workers.len();
        let worker = self
            .workers
            .get(lane)
            .ok_or(LookbackError::LaneOutOfRange { lane, num_lanes })?;
        worker
            .cmd
            .send(cmd)
            .map_err(|_| LookbackError::WorkerDisconnected(lane))?;
        Ok(())
    }

    fn recv(&self, lane: usize) -> Result<Response> {
        match self.workers[lane].resp.recv() {
            Ok(Response::Err(msg)) => bail!("Worker of lane {}: {}", lane, msg),
            Ok(r) => Ok(r),
            Err(_) => Err(LookbackError::WorkerDisconnected(lane).into()),
        }
    }

    fn request(&self, lane: usize, cmd: Command) -> Result<Response> {
        if self.waiting {
            bail!("Simulator access while a step is in flight");
        }
        self.send(lane, cmd)?;
        self.recv(lane)
    }

    fn shutdown(&mut self) {
        for w in self.workers.iter_mut() {
            let _ = w.cmd.send(Command::Close);
            if let Some(handle) = w.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl MultiAgentVecEnv for ThreadedVecMultiEnv {
    fn num_lanes(&self) -> usize {
        self.workers.len()
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
        trace!("ThreadedVecMultiEnv::reset()");
        if self.waiting {
            // Drain the step in flight so responses stay paired with commands.
            self.step_wait()?;
        }
        for lane in 0..self.num_lanes() {
            self.send(lane, Command::Reset)?;
        }
        // Every lane is drained before an error is reported.
        let obs = (0..self.num_lanes())
            .map(|lane| match self.recv(lane)? {
                Response::Obs(o) => Ok(o),
                _ => bail!("Unexpected response to reset from lane {}", lane),
            })
            .collect::<Vec<Result<_>>>();
        let obs = obs.into_iter().collect::<Result<Vec<_>>>()?;
        stack_obs(&obs, self.num_agents())
    }

    fn step_async(&mut self, acts: Vec<ActBatch>) -> Result<()> {
        if self.waiting {
            bail!("step_async called while a step is in flight");
        }
        let acts = lane_actions(&acts, self.num_agents(), self.num_lanes())?;
        let sent = acts
            .into_iter()
            .enumerate()
            .map(|(lane, a)| self.send(lane, Command::Step(a)))
            .collect::<Vec<_>>();
        if sent.iter().any(|r| r.is_err()) {
            // Discard the steps of the lanes that received their actions.
            for (lane, _) in sent.iter().enumerate().filter(|(_, r)| r.is_ok()) {
                let _ = self.recv(lane);
            }
            return sent.into_iter().collect();
        }
        self.waiting = true;
        Ok(())
    }

    fn step_wait(&mut self) -> Result<MultiStep> {
        if !self.waiting {
            return Err(LookbackError::NoPendingStep.into());
        }
        self.waiting = false;
        let steps = (0..self.num_lanes())
            .map(|lane| match self.recv(lane)? {
                Response::Step(s) => Ok(s),
                _ => bail!("Unexpected response to step from lane {}", lane),
            })
            .collect::<Vec<Result<_>>>();
        let steps = steps.into_iter().collect::<Result<Vec<_>>>()?;
        collect_steps(steps, self.num_agents())
    }

    fn close(&mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl Simulator for ThreadedVecMultiEnv {
    fn get_state(&self, lane: usize) -> Result<SimState> {
        match self.request(lane, Command::GetState)? {
            Response::State(s) => Ok(s),
            _ => bail!("Unexpected response to get_state from lane {}", lane),
        }
    }

    fn set_state(
        &mut self,
        lane: usize,
        state: &SimState,
        full: Option<&FullSimState>,
        forward: bool,
    ) -> Result<()> {
        let cmd = Command::SetState(state.clone(), full.cloned(), forward);
        match self.request(lane, cmd)? {
            Response::Ok => Ok(()),
            _ => bail!("Unexpected response to set_state from lane {}", lane),
        }
    }

    fn get_full_state(&self, lane: usize) -> Result<FullSimState> {
        match self.request(lane, Command::GetFullState)? {
            Response::FullState(s) => Ok(s),
            _ => bail!("Unexpected response to get_full_state from lane {}", lane),
        }
    }

    fn get_radius(&self, lane: usize) -> Result<f32> {
        match self.request(lane, Command::GetRadius)? {
            Response::Radius(r) => Ok(r),
            _ => bail!("Unexpected response to get_radius from lane {}", lane),
        }
    }

    fn set_radius(&mut self, lane: usize, radius: f32) -> Result<()> {
        match self.request(lane, Command::SetRadius(radius))? {
            Response::Ok => Ok(()),
            _ => bail!("Unexpected response to set_radius from lane {}", lane),
        }
    }
}

impl Pipeline for ThreadedVecMultiEnv {
    fn simulator(&mut self) -> &mut dyn Simulator {
        self
    }
}

impl Drop for ThreadedVecMultiEnv {
    fn drop(&mut self) {
        self.shutdown();
    }
}
