//! The ring of shadow environments.
use lookback_core::{record::Record, ActBatch, ObsBatch, Prediction, RecurrentState};
use ndarray::Axis;
use std::collections::VecDeque;

/// Per-slot data of the learner's lineage in a shadow world.
#[derive(Clone, Debug, Default)]
pub(super) struct SlotData {
    /// Action the learner takes in this slot on the next step.
    pub action: Option<ActBatch>,

    /// Recurrent state the learner's action was computed with.
    pub state: Option<RecurrentState>,

    /// Reward of the last step.
    pub reward: Vec<f32>,

    /// Victim info of the last step, one record per lane.
    pub victim_info: Vec<Record>,
}

impl SlotData {
    /// Data of a fresh lineage starting from `pred`.
    pub fn fresh(pred: &Prediction, n_lanes: usize) -> Self {
        Self {
            action: Some(pred.act.clone()),
            state: pred.state.clone(),
            reward: vec![0.0; n_lanes],
            victim_info: vec![Record::empty(); n_lanes],
        }
    }

    /// Restarts the lineage of `lane` from `pred`.
    pub fn reset_lane(&mut self, lane: usize, pred: &Prediction) {
        match self.action.as_mut() {
            Some(act) => act
                .index_axis_mut(Axis(0), lane)
                .assign(&pred.act.index_axis(Axis(0), lane)),
            None => self.action = Some(pred.act.clone()),
        }
        match (self.state.as_mut(), pred.state.as_ref()) {
            (Some(state), Some(initial)) => state.copy_lane_from(lane, initial),
            (None, Some(initial)) => self.state = Some(initial.clone()),
            (_, None) => self.state = None,
        }
        if let Some(r) = self.reward.get_mut(lane) {
            *r = 0.0;
        }
        if let Some(info) = self.victim_info.get_mut(lane) {
            *info = Record::empty();
        }
    }
}

/// A shadow environment together with the learner's data in it.
pub struct ShadowSlot<S> {
    id: usize,
    pub(super) venv: S,
    pub(super) data: SlotData,
}

impl<S> ShadowSlot<S> {
    /// Identity of the slot, stable across rotations.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The shadow environment.
    pub fn venv(&self) -> &S {
        &self.venv
    }

    /// The learner's next action in this slot.
    pub fn action(&self) -> Option<&ActBatch> {
        self.data.action.as_ref()
    }

    /// The learner's recurrent state in this slot.
    pub fn state(&self) -> Option<&RecurrentState> {
        self.data.state.as_ref()
    }

    /// Rewards of the last step.
    pub fn reward(&self) -> &[f32] {
        &self.data.reward
    }

    /// Victim info of the last step.
    pub fn victim_info(&self) -> &[Record] {
        &self.data.victim_info
    }
}

/// Ring of `K + 1` shadow slots.
///
/// The position of a slot is its offset: the slot at offset `i` was
/// synchronized with the live world `i` steps ago and has since followed the
/// learner's policy. Each step the oldest slot moves to offset 0 and becomes
/// the new baseline; every other slot's offset grows by one.
pub struct ShadowPool<S> {
    slots: VecDeque<ShadowSlot<S>>,
}

impl<S> ShadowPool<S> {
    pub(super) fn new(venvs: Vec<S>) -> Self {
        Self {
            slots: venvs
                .into_iter()
                .enumerate()
                .map(|(id, venv)| ShadowSlot {
                    id,
                    venv,
                    data: SlotData::default(),
                })
                .collect(),
        }
    }

    /// The number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Moves the oldest slot to offset 0.
    pub(super) fn rotate(&mut self) {
        if !self.slots.is_empty() {
            self.slots.rotate_right(1);
        }
    }

    /// Slot at `offset`.
    pub fn get(&self, offset: usize) -> Option<&ShadowSlot<S>> {
        self.slots.get(offset)
    }

    pub(super) fn get_mut(&mut self, offset: usize) -> Option<&mut ShadowSlot<S>> {
        self.slots.get_mut(offset)
    }

    /// Slot identities ordered by offset.
    pub fn ids(&self) -> Vec<usize> {
        self.slots.iter().map(|s| s.id).collect()
    }

    /// Slots ordered by offset.
    pub fn iter(&self) -> impl Iterator<Item = &ShadowSlot<S>> {
        self.slots.iter()
    }

    pub(super) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShadowSlot<S>> {
        self.slots.iter_mut()
    }
}

/// Keeps the leading `dim` features of each row, the part of an observation
/// the learner's policy consumes.
pub(super) fn truncate(obs: &ObsBatch, dim: usize) -> ObsBatch {
    let dim = dim.min(obs.ncols());
    obs.slice(ndarray::s![.., ..dim]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_is_a_permutation() {
        let mut pool = ShadowPool::new(vec![(); 4]);
        assert_eq!(pool.ids(), vec![0, 1, 2, 3]);
        pool.rotate();
        assert_eq!(pool.ids(), vec![3, 0, 1, 2]);
        for _ in 0..7 {
            pool.rotate();
            let mut ids = pool.ids();
            ids.sort();
            assert_eq!(ids, vec![0, 1, 2, 3]);
        }
        // Eight rotations of four slots bring the ring back.
        assert_eq!(pool.ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_reset_lane_restarts_lineage() {
        let pred = Prediction {
            act: ndarray::arr2(&[[1.0], [2.0]]),
            state: Some(RecurrentState::zeros(2, 1, 3)),
            transparent: None,
        };
        let mut data = SlotData::fresh(&pred, 2);
        data.action = Some(ndarray::arr2(&[[5.0], [6.0]]));
        data.state = Some(RecurrentState::from_array(ndarray::Array3::ones((2, 1, 3))));
        data.reward = vec![1.0, 1.0];

        data.reset_lane(1, &pred);
        assert_eq!(data.action.as_ref().unwrap(), &ndarray::arr2(&[[5.0], [2.0]]));
        let state = data.state.as_ref().unwrap();
        assert!(state.lane(0).iter().all(|v| *v == 1.0));
        assert!(state.lane(1).iter().all(|v| *v == 0.0));
        assert_eq!(data.reward, vec![1.0, 0.0]);
    }

    #[test]
    fn test_truncate() {
        let obs = ndarray::arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(truncate(&obs, 2), ndarray::arr2(&[[1.0, 2.0], [4.0, 5.0]]));
        assert_eq!(truncate(&obs, 5), obs);
    }
}
