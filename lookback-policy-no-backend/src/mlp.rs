use anyhow::Result;
use log::info;
use lookback_core::{
    error::LookbackError,
    record::{Record, RecordValue},
    ActBatch, BoxSpace, Configurable, ObsBatch, Policy, Prediction, RecurrentState,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
/// Single hidden layer network with tanh activations and an optional
/// recurrent connection on the hidden layer.
pub struct Mlp {
    /// Input weights, `(hidden, obs)`.
    w_in: Array2<f32>,

    /// Recurrent weights, `(hidden, hidden)`.
    w_rec: Option<Array2<f32>>,

    /// Hidden bias.
    b: Array1<f32>,

    /// Output weights, `(act, hidden)`.
    w_out: Array2<f32>,

    /// Output bias.
    b_out: Array1<f32>,
}

impl Mlp {
    /// Uniformly initialized network, scaled by the fan-in of each layer.
    pub fn random(obs_dim: usize, hidden_dim: usize, act_dim: usize, recurrent: bool, seed: u64) -> Self {
        let rng = fastrand::Rng::with_seed(seed);
        let uniform = |shape: (usize, usize), fan_in: usize| {
            let scale = 1.0 / (fan_in.max(1) as f32).sqrt();
            Array2::from_shape_fn(shape, |_| (rng.f32() * 2.0 - 1.0) * scale)
        };

        Self {
            w_in: uniform((hidden_dim, obs_dim), obs_dim),
            w_rec: match recurrent {
                true => Some(uniform((hidden_dim, hidden_dim), hidden_dim)),
                false => None,
            },
            b: Array1::zeros(hidden_dim),
            w_out: uniform((act_dim, hidden_dim), hidden_dim),
            b_out: Array1::zeros(act_dim),
        }
    }

    /// Hidden features for a batch of inputs, `(lanes, hidden)`.
    pub fn hidden(&self, x: &Array2<f32>, h_prev: Option<&Array2<f32>>) -> Array2<f32> {
        let mut z = x.dot(&self.w_in.t()) + &self.b;
        if let (Some(w_rec), Some(h)) = (self.w_rec.as_ref(), h_prev) {
            z = z + h.dot(&w_rec.t());
        }
        z.mapv_inplace(f32::tanh);
        z
    }

    /// Outputs in `[-1, 1]` for a batch of hidden features.
    pub fn output(&self, h: &Array2<f32>) -> Array2<f32> {
        (h.dot(&self.w_out.t()) + &self.b_out).mapv(f32::tanh)
    }

    fn dims(&self) -> (usize, usize, usize) {
        (self.w_in.ncols(), self.w_in.nrows(), self.w_out.nrows())
    }
}

/// Configuration of [`MlpPolicy`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct MlpPolicyConfig {
    /// Observation space.
    pub obs_space: BoxSpace,

    /// Action space.
    pub act_space: BoxSpace,

    /// Width of the hidden layer.
    pub hidden_dim: usize,

    /// Use a recurrent hidden layer.
    pub recurrent: bool,

    /// Expose hidden features and inputs in [`Prediction::transparent`].
    pub transparent: bool,

    /// Seed of the random initialization, used when `params_path` is `None`.
    pub seed: u64,

    /// YAML file of [`Mlp`] parameters.
    pub params_path: Option<PathBuf>,
}

impl MlpPolicyConfig {
    /// Configuration with a hidden layer of width 16.
    pub fn new(obs_space: BoxSpace, act_space: BoxSpace) -> Self {
        Self {
            obs_space,
            act_space,
            hidden_dim: 16,
            recurrent: false,
            transparent: false,
            seed: 0,
            params_path: None,
        }
    }

    /// Sets the width of the hidden layer.
    pub fn hidden_dim(mut self, v: usize) -> Self {
        self.hidden_dim = v;
        self
    }

    /// Sets whether the hidden layer is recurrent.
    pub fn recurrent(mut self, v: bool) -> Self {
        self.recurrent = v;
        self
    }

    /// Sets whether internal signals are exposed.
    pub fn transparent(mut self, v: bool) -> Self {
        self.transparent = v;
        self
    }

    /// Sets the seed of the random initialization.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the path of the parameter file.
    pub fn params_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.params_path = Some(v.into());
        self
    }

    /// Constructs [`MlpPolicyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`MlpPolicyConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A learned policy backed by [`Mlp`].
///
/// A recurrent policy carries its hidden features as the recurrent state,
/// shape `(lanes, 1, hidden)`. A transparent policy reports, per lane, the
/// hidden features under `"ff"` and the observation under `"obs"`.
pub struct MlpPolicy {
    obs_space: BoxSpace,
    act_space: BoxSpace,
    recurrent: bool,
    transparent: bool,
    mlp: Mlp,
}

impl Configurable for MlpPolicy {
    type Config = MlpPolicyConfig;

    fn build(config: Self::Config) -> Result<Self> {
        let mlp = match &config.params_path {
            Some(path) => {
                let rdr = BufReader::new(File::open(path)?);
                let mlp: Mlp = serde_yaml::from_reader(rdr)?;
                info!("Loaded policy parameters from {:?}", path);
                mlp
            }
            None => Mlp::random(
                config.obs_space.dim(),
                config.hidden_dim,
                config.act_space.dim(),
                config.recurrent,
                config.seed,
            ),
        };

        let (obs_dim, _, act_dim) = mlp.dims();
        if obs_dim != config.obs_space.dim() || act_dim != config.act_space.dim() {
            return Err(LookbackError::config(format!(
                "Parameters of shape (obs {}, act {}) do not fit spaces of dims (obs {}, act {})",
                obs_dim,
                act_dim,
                config.obs_space.dim(),
                config.act_space.dim()
            )));
        }
        if mlp.w_rec.is_some() != config.recurrent {
            return Err(LookbackError::config(
                "Recurrence of parameters and configuration differ",
            ));
        }

        Ok(Self {
            obs_space: config.obs_space,
            act_space: config.act_space,
            recurrent: config.recurrent,
            transparent: config.transparent,
            mlp,
        })
    }
}

impl MlpPolicy {
    /// Saves the parameters to a YAML file.
    pub fn save_params(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self.mlp)?.as_bytes())?;
        Ok(())
    }

    fn hidden_dim(&self) -> usize {
        self.mlp.dims().1
    }
}

impl Policy for MlpPolicy {
    fn observation_space(&self) -> &BoxSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn initial_state(&self, n_lanes: usize) -> Option<RecurrentState> {
        match self.recurrent {
            true => Some(RecurrentState::zeros(n_lanes, 1, self.hidden_dim())),
            false => None,
        }
    }

    fn predict(
        &mut self,
        obs: &ObsBatch,
        state: Option<&RecurrentState>,
        mask: &[i8],
    ) -> Result<Prediction> {
        if obs.ncols() != self.obs_space.dim() {
            return Err(LookbackError::config(format!(
                "Observation of dim {} given to a policy of dim {}",
                obs.ncols(),
                self.obs_space.dim()
            )));
        }
        let n = obs.nrows();

        let h_prev = match self.initial_state(n) {
            Some(initial) => {
                let mut s = state.cloned().unwrap_or_else(|| initial.clone());
                s.reset_lanes(mask, &initial);
                Some(s.as_array().index_axis(Axis(1), 0).to_owned())
            }
            None => None,
        };
        let h = self.mlp.hidden(obs, h_prev.as_ref());

        let mut act: ActBatch = self.mlp.output(&h);
        for mut row in act.rows_mut() {
            let mut v = row.to_vec();
            self.act_space.scale_from_unit(&mut v);
            row.assign(&ArrayView1::from(&v));
        }

        let transparent = match self.transparent {
            true => Some(
                (0..n)
                    .map(|i| {
                        Record::from_slice(&[
                            ("ff", RecordValue::Array1(h.row(i).to_vec())),
                            ("obs", RecordValue::Array1(obs.row(i).to_vec())),
                        ])
                    })
                    .collect(),
            ),
            false => None,
        };

        let state = match self.recurrent {
            true => Some(RecurrentState::from_array(h.insert_axis(Axis(1)))),
            false => None,
        };

        Ok(Prediction {
            act,
            state,
            transparent,
        })
    }

    fn is_transparent(&self) -> bool {
        self.transparent
    }
}
