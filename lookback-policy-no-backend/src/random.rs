use anyhow::Result;
use lookback_core::{ActBatch, BoxSpace, ObsBatch, Policy, Prediction, RecurrentState};

/// Policy that samples actions uniformly from the action space.
pub struct RandomPolicy {
    obs_space: BoxSpace,
    act_space: BoxSpace,
    rng: fastrand::Rng,
}

impl RandomPolicy {
    /// Constructs the policy with a random seed.
    pub fn new(obs_space: BoxSpace, act_space: BoxSpace, seed: u64) -> Self {
        Self {
            obs_space,
            act_space,
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn observation_space(&self) -> &BoxSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn predict(
        &mut self,
        obs: &ObsBatch,
        _state: Option<&RecurrentState>,
        _mask: &[i8],
    ) -> Result<Prediction> {
        let (low, high) = (&self.act_space.low, &self.act_space.high);
        let rng = &self.rng;
        let act = ActBatch::from_shape_fn((obs.nrows(), low.len()), |(_, j)| {
            low[j] + rng.f32() * (high[j] - low[j])
        });
        Ok(Prediction {
            act,
            state: None,
            transparent: None,
        })
    }
}
