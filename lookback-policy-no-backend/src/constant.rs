use anyhow::Result;
use lookback_core::{
    error::LookbackError, ActBatch, BoxSpace, ObsBatch, Policy, Prediction, RecurrentState,
};

/// Policy that returns the same action in every lane.
#[derive(Clone, Debug)]
pub struct ConstantPolicy {
    obs_space: BoxSpace,
    act_space: BoxSpace,
    constant: Vec<f32>,
}

impl ConstantPolicy {
    /// Fails with a configuration error if `constant` lies outside `act_space`.
    pub fn new(obs_space: BoxSpace, act_space: BoxSpace, constant: Vec<f32>) -> Result<Self> {
        if !act_space.contains(&constant) {
            return Err(LookbackError::config(format!(
                "Constant action {:?} is not in the action space",
                constant
            )));
        }
        Ok(Self {
            obs_space,
            act_space,
            constant,
        })
    }
}

/// Policy that returns a zero action.
pub fn zero_policy(obs_space: BoxSpace, act_space: BoxSpace) -> Result<ConstantPolicy> {
    let constant = vec![0.0; act_space.dim()];
    ConstantPolicy::new(obs_space, act_space, constant)
}

impl Policy for ConstantPolicy {
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
        let act = ActBatch::from_shape_fn((obs.nrows(), self.constant.len()), |(_, j)| {
            self.constant[j]
        });
        Ok(Prediction {
            act,
            state: None,
            transparent: None,
        })
    }
}
