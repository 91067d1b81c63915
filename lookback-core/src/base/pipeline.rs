//! Introspection of wrapper stacks.
use super::{ObsBatch, RecurrentState, Simulator};
use crate::record::Record;
use anyhow::Result;

/// A layer of an environment pipeline that can expose the layers beneath it.
///
/// Wrappers delegate to the environment they wrap; the layer that owns the
/// capability answers for itself.
pub trait Pipeline {
    /// The simulator at the bottom of the pipeline.
    fn simulator(&mut self) -> &mut dyn Simulator;

    /// The outermost curry layer, if any.
    fn curried(&mut self) -> Option<&mut dyn Curried> {
        None
    }

    /// Takes the debug trace of the last completed step, if a debug layer exists.
    fn take_trace(&mut self) -> Option<Record> {
        None
    }
}

/// A layer that acts for one agent slot with a fixed policy.
pub trait Curried {
    /// The curried agent's most recent observation, the context its policy acts on next.
    fn get_obs(&self) -> Option<ObsBatch>;

    /// Overwrites the curried agent's observation, for all lanes or a single lane.
    fn set_obs(&mut self, obs: &ObsBatch, lane: Option<usize>) -> Result<()>;

    /// Resets the fixed policy's recurrent state of `lane` to its initial value.
    fn reset_lane(&mut self, lane: usize);

    /// Recurrent state of the fixed policy, `None` before the first step or
    /// for a feed-forward policy.
    fn policy_state(&self) -> Option<&RecurrentState>;

    /// Episode-end flags of the last step, the mask the fixed policy acts with next.
    fn dones(&self) -> &[i8];

    /// Overwrites the fixed policy's recurrent state and its next mask.
    ///
    /// Together with [`Curried::set_obs`] this puts the fixed policy in the
    /// context of another pipeline's curried policy.
    fn set_policy_state(&mut self, state: Option<&RecurrentState>, dones: &[i8]) -> Result<()>;

    /// Information of the curried agent from the last step, one record per lane,
    /// including the internal signals of a transparent policy.
    fn curried_info(&self) -> &[Record];

    /// Returns `true` if the fixed policy exposes internal signals.
    fn is_transparent(&self) -> bool;
}
