//! Utilities for interaction of policies and environments.
use crate::{error::LookbackError, MultiAgentVecEnv, MultiStep, Policy, RecurrentState};
use anyhow::Result;
use log::trace;

/// Runs `venv` for `n_steps` steps with one policy per agent slot.
///
/// Each policy keeps its own recurrent state across steps and receives the
/// done flags of the previous step as its reset mask. Every step is handed
/// to `f` together with the step index.
pub fn simulate<E, F>(
    venv: &mut E,
    policies: &mut [Box<dyn Policy>],
    n_steps: usize,
    mut f: F,
) -> Result<()>
where
    E: MultiAgentVecEnv + ?Sized,
    F: FnMut(usize, &MultiStep) -> Result<()>,
{
    if policies.len() != venv.num_agents() {
        return Err(LookbackError::config(format!(
            "{} policies given for {} agents",
            policies.len(),
            venv.num_agents()
        )));
    }

    let mut obs = venv.reset()?;
    let mut dones = vec![0i8; venv.num_lanes()];
    let mut states: Vec<Option<RecurrentState>> = vec![None; policies.len()];

    for ix in 0..n_steps {
        let mut acts = Vec::with_capacity(policies.len());
        for ((policy, o), state) in policies.iter_mut().zip(obs.iter()).zip(states.iter_mut()) {
            let pred = policy.predict(o, state.as_ref(), &dones)?;
            *state = pred.state;
            acts.push(pred.act);
        }

        let step = venv.step(acts)?;
        trace!("simulate: step {}, dones {:?}", ix, step.is_done);
        f(ix, &step)?;
        dones = step.is_done.clone();
        obs = step.obs;
    }

    Ok(())
}
