use anyhow::Result;
use log::info;
use lookback_core::{BoxSpace, Configurable, Policy, VecEnv};
use lookback_policy_no_backend::{MlpPolicy, MlpPolicyConfig, RandomPolicy};
use lookback_vec_env::{
    ArenaConfig, ArenaSim, EmbedVictimVecEnv, FlattenSingletonVecEnv, LookbackConfig,
    LookbackRewardVecEnv, VecMultiEnv, VecMultiEnvConfig,
};

const N_LANES: usize = 4;
const N_STEPS: usize = 300;
const VICTIM_INDEX: usize = 1;

type Env = FlattenSingletonVecEnv<EmbedVictimVecEnv<VecMultiEnv<ArenaSim>, MlpPolicy>>;

fn obs_space() -> BoxSpace {
    BoxSpace::uniform(8, f32::NEG_INFINITY, f32::INFINITY)
}

fn act_space() -> BoxSpace {
    BoxSpace::uniform(2, -1.0, 1.0)
}

fn victim_config() -> MlpPolicyConfig {
    MlpPolicyConfig::new(obs_space(), act_space())
        .recurrent(true)
        .transparent(true)
        .seed(1)
}

fn env(arena: &ArenaConfig, seed: u64) -> Result<Env> {
    let config = VecMultiEnvConfig::default().n_lanes(N_LANES).seed(seed);
    let venv = VecMultiEnv::build(&config, |seed| ArenaSim::new(arena.clone(), seed))?;
    let venv = EmbedVictimVecEnv::new(venv, MlpPolicy::build(victim_config())?, VICTIM_INDEX)?;
    FlattenSingletonVecEnv::new(venv)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let arena = ArenaConfig::default().max_steps(100);
    let learner = MlpPolicy::build(MlpPolicyConfig::new(obs_space(), act_space()).seed(2))?;
    let config = LookbackConfig::default().lookback_num(3);
    let mut venv = LookbackRewardVecEnv::new(env(&arena, 0)?, learner, config, |i| {
        env(&arena, 1000 * (i as u64 + 1))
    })?;
    let mut explorer = RandomPolicy::new(obs_space(), act_space(), 42);

    let mut obs = venv.reset()?;
    for t in 0..N_STEPS {
        let act = explorer.predict(&obs, None, &[0; N_LANES])?.act;
        let step = venv.step(act)?;
        obs = step.obs;

        if (t + 1) % 50 == 0 {
            let stats = venv.flush_stats();
            info!(
                "step {}: bonus mean = {:.4}, max = {:.4}",
                t + 1,
                stats.get_scalar("lookback_bonus_mean")?,
                stats.get_scalar("lookback_bonus_max")?
            );
        }
    }
    venv.close()?;

    Ok(())
}
