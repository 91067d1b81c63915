#![allow(dead_code)]
use anyhow::Result;
use lookback_core::{error::LookbackError, BoxSpace, Configurable};
use lookback_policy_no_backend::{MlpPolicy, MlpPolicyConfig};
use lookback_vec_env::{
    ArenaConfig, ArenaSim, DebugVecEnv, EmbedVictimVecEnv, FlattenSingletonVecEnv, VecMultiEnv,
    VecMultiEnvConfig,
};

pub type Multi = VecMultiEnv<ArenaSim>;
pub type Single = FlattenSingletonVecEnv<EmbedVictimVecEnv<DebugVecEnv<Multi>, MlpPolicy>>;

/// Observation dim of a two-agent arena.
pub const OBS_DIM: usize = 8;

pub fn obs_space(dim: usize) -> BoxSpace {
    BoxSpace::uniform(dim, f32::NEG_INFINITY, f32::INFINITY)
}

pub fn act_space() -> BoxSpace {
    BoxSpace::uniform(2, -1.0, 1.0)
}

pub fn multi(arena: &ArenaConfig, n_lanes: usize, seed: u64, use_dummy: bool) -> Result<Multi> {
    let config = VecMultiEnvConfig::default()
        .n_lanes(n_lanes)
        .seed(seed)
        .use_dummy(use_dummy);
    VecMultiEnv::build(&config, |seed| ArenaSim::new(arena.clone(), seed))
}

pub fn victim_config(recurrent: bool) -> MlpPolicyConfig {
    MlpPolicyConfig::new(obs_space(OBS_DIM), act_space())
        .hidden_dim(8)
        .recurrent(recurrent)
        .transparent(true)
        .seed(11)
}

pub fn learner(obs_dim: usize, recurrent: bool) -> Result<MlpPolicy> {
    MlpPolicy::build(
        MlpPolicyConfig::new(obs_space(obs_dim), act_space())
            .hidden_dim(6)
            .recurrent(recurrent)
            .seed(5),
    )
}

/// Live or shadow pipeline: the victim in slot 1, the learner in slot 0.
pub fn single(
    arena: &ArenaConfig,
    victim: &MlpPolicyConfig,
    n_lanes: usize,
    seed: u64,
    use_dummy: bool,
) -> Result<Single> {
    let venv = DebugVecEnv::new(multi(arena, n_lanes, seed, use_dummy)?);
    let venv = EmbedVictimVecEnv::new(venv, MlpPolicy::build(victim.clone())?, 1)?;
    FlattenSingletonVecEnv::new(venv)
}

pub fn assert_config_error<T>(r: Result<T>) {
    match r {
        Ok(_) => panic!("Expected a configuration error"),
        Err(e) => assert!(
            matches!(
                e.downcast_ref::<LookbackError>(),
                Some(LookbackError::ConfigurationError(_))
            ),
            "Unexpected error: {}",
            e
        ),
    }
}
