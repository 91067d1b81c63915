#![warn(missing_docs)]
//! Vectorized multi-agent environment pipelines and lookback reward augmentation.
//!
//! A pipeline is assembled bottom-up:
//!
//! * [`VecMultiEnv`] steps a batch of [`LaneSim`] lanes, such as [`ArenaSim`],
//!   sequentially or in worker threads.
//! * [`DebugVecEnv`] and [`TrajectoryRecorder`] observe the data flowing
//!   through the pipeline.
//! * [`EmbedVictimVecEnv`] fixes the victim's agent slot to the victim policy
//!   with a [`CurryVecEnv`].
//! * [`FlattenSingletonVecEnv`] turns the remaining single agent slot into a
//!   [`VecEnv`](lookback_core::VecEnv).
//! * [`LookbackRewardVecEnv`] adds the lookback bonus to the learner's reward,
//!   driving a pool of shadow pipelines of the same shape.
//!
//! ```no_run
//! use anyhow::Result;
//! use lookback_core::{Configurable, VecEnv};
//! use lookback_policy_no_backend::{MlpPolicy, MlpPolicyConfig};
//! use lookback_vec_env::{
//!     ArenaConfig, ArenaSim, EmbedVictimVecEnv, FlattenSingletonVecEnv, LookbackConfig,
//!     LookbackRewardVecEnv, VecMultiEnv, VecMultiEnvConfig,
//! };
//!
//! fn pipeline(
//!     victim: MlpPolicyConfig,
//! ) -> Result<FlattenSingletonVecEnv<EmbedVictimVecEnv<VecMultiEnv<ArenaSim>, MlpPolicy>>> {
//!     let config = VecMultiEnvConfig::default().n_lanes(4);
//!     let venv = VecMultiEnv::build(&config, |seed| ArenaSim::new(ArenaConfig::default(), seed))?;
//!     let venv = EmbedVictimVecEnv::new(venv, MlpPolicy::build(victim)?, 1)?;
//!     FlattenSingletonVecEnv::new(venv)
//! }
//!
//! fn main() -> Result<()> {
//!     let obs_space = lookback_core::BoxSpace::uniform(8, f32::NEG_INFINITY, f32::INFINITY);
//!     let act_space = lookback_core::BoxSpace::uniform(2, -1.0, 1.0);
//!     let victim = MlpPolicyConfig::new(obs_space.clone(), act_space.clone()).transparent(true);
//!     let learner = MlpPolicy::build(MlpPolicyConfig::new(obs_space, act_space))?;
//!
//!     let mut venv = LookbackRewardVecEnv::new(
//!         pipeline(victim.clone())?,
//!         learner,
//!         LookbackConfig::default().lookback_num(2),
//!         |_| pipeline(victim.clone()),
//!     )?;
//!     venv.reset()?;
//!     let act = venv.predicted_action().cloned().unwrap();
//!     let step = venv.step(act)?;
//!     println!("{:?}", step.reward);
//!     Ok(())
//! }
//! ```
mod arena;
mod curry;
mod debug;
mod embed;
mod flatten;
mod lookback;
mod trajectory;
mod vec;
pub use arena::{ArenaConfig, ArenaSim};
pub use curry::CurryVecEnv;
pub use debug::DebugVecEnv;
pub use embed::EmbedVictimVecEnv;
pub use flatten::FlattenSingletonVecEnv;
pub use lookback::{
    lookback_bonus, BonusNormalization, LookbackConfig, LookbackRewardVecEnv, ShadowPool,
    ShadowSlot,
};
pub use trajectory::{
    AgentTrajectories, EnvKey, TrajectoryRecorder, TrajectoryRecorderConfig, EPISODE_RETURNS,
};
pub use vec::{
    DummyVecMultiEnv, LaneSim, LaneStep, ThreadedVecMultiEnv, VecMultiEnv, VecMultiEnvConfig,
};
