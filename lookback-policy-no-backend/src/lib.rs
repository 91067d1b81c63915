//! Fixed policies that run without a tensor backend.
//!
//! These cover the policy variants used when assembling environment
//! pipelines: [`ConstantPolicy`] (and [`zero_policy`]), [`RandomPolicy`], and
//! the learned [`MlpPolicy`], whose parameters are plain matrices loaded from
//! YAML. An [`MlpPolicy`] can be recurrent and can be transparent, exposing its
//! hidden features for introspection.
mod constant;
mod mlp;
mod random;
pub use constant::{zero_policy, ConstantPolicy};
pub use mlp::{Mlp, MlpPolicy, MlpPolicyConfig};
pub use random::RandomPolicy;
