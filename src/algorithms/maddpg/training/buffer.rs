//! Fixed-capacity replay store for MADDPG transitions.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tch::{Device, Kind, Tensor};

use crate::error::ConfigError;

/// A single transition from one agent's perspective.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Owner's observation.
    pub state: Vec<f64>,
    /// Owner's action.
    pub action: Vec<f64>,
    /// Owner's reward.
    pub reward: f64,
    /// Every other agent's observation, concatenated in the owner's stored slot order.
    pub others_states: Vec<f64>,
    /// Every other agent's action, same order as `others_states`.
    pub others_actions: Vec<f64>,
}

/// Column-stacked sample drawn from a [`ReplayBuffer`].
///
/// Every field is row-major with `len` rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionBatch {
    pub states: Vec<f64>,
    pub actions: Vec<f64>,
    pub rewards: Vec<f64>,
    pub others_states: Vec<f64>,
    pub others_actions: Vec<f64>,
    pub len: usize,
}

impl TransitionBatch {
    fn with_capacity(n: usize) -> Self {
        Self {
            rewards: Vec::with_capacity(n),
            ..Self::default()
        }
    }

    fn push(&mut self, t: &Transition) {
        self.states.extend_from_slice(&t.state);
        self.actions.extend_from_slice(&t.action);
        self.rewards.push(t.reward);
        self.others_states.extend_from_slice(&t.others_states);
        self.others_actions.extend_from_slice(&t.others_actions);
        self.len += 1;
    }

    /// Converts the batch into float tensors on `device`.
    pub fn to_tensors(&self, device: Device) -> BatchTensors {
        let rows = self.len as i64;
        let matrix = |data: &[f64]| {
            Tensor::from_slice(data)
                .reshape([rows, -1])
                .to_kind(Kind::Float)
                .to_device(device)
        };
        BatchTensors {
            states: matrix(&self.states),
            actions: matrix(&self.actions),
            rewards: matrix(&self.rewards),
            others_states: matrix(&self.others_states),
            others_actions: matrix(&self.others_actions),
        }
    }
}

/// Tensor view of a [`TransitionBatch`]; every tensor is `[B, width]`.
#[derive(Debug)]
pub struct BatchTensors {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub others_states: Tensor,
    pub others_actions: Tensor,
}

/// Circular transition log with a monotonic write counter.
///
/// Writes go to `count % capacity`; once full, the oldest entry is overwritten.
/// The counter never resets.
#[derive(Debug)]
pub struct ReplayBuffer {
    entries: Vec<Transition>,
    capacity: usize,
    count: u64,
    rng: StdRng,
}

impl ReplayBuffer {
    /// Creates an empty store. `seed = None` draws the RNG state from entropy.
    pub fn new(capacity: usize, seed: Option<u64>) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Validation(
                "replay capacity must be > 0".into(),
            ));
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            entries: Vec::new(),
            capacity,
            count: 0,
            rng,
        })
    }

    /// Records a transition, overwriting the oldest entry once full.
    pub fn store(&mut self, transition: Transition) {
        let index = (self.count % self.capacity as u64) as usize;
        if index < self.entries.len() {
            self.entries[index] = transition;
        } else {
            self.entries.push(transition);
        }
        self.count += 1;
    }

    /// Draws `batch_size` entries uniformly at random, with replacement, from
    /// the valid range. Returns an empty batch when nothing has been stored.
    pub fn sample(&mut self, batch_size: usize) -> TransitionBatch {
        let valid = self.len();
        let mut batch = TransitionBatch::with_capacity(batch_size);
        if valid == 0 {
            return batch;
        }
        for _ in 0..batch_size {
            let i = self.rng.gen_range(0..valid);
            batch.push(&self.entries[i]);
        }
        batch
    }

    /// Returns the last `min(len, batch_size)` entries in insertion order.
    pub fn sample_recent(&self, batch_size: usize) -> TransitionBatch {
        let n = batch_size.min(self.len()) as u64;
        let mut batch = TransitionBatch::with_capacity(n as usize);
        for k in (self.count - n)..self.count {
            batch.push(&self.entries[(k % self.capacity as u64) as usize]);
        }
        batch
    }

    /// The most recently stored transition.
    pub fn last(&self) -> Option<&Transition> {
        if self.count == 0 {
            return None;
        }
        let index = ((self.count - 1) % self.capacity as u64) as usize;
        self.entries.get(index)
    }

    /// Number of valid entries, `min(count, capacity)`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of writes since creation.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when at least `batch_size` valid entries are available.
    pub fn has_enough(&self, batch_size: usize) -> bool {
        self.len() >= batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(tag: f64) -> Transition {
        Transition {
            state: vec![tag],
            action: vec![tag / 10.0],
            reward: tag,
            others_states: vec![tag + 0.5],
            others_actions: vec![tag + 0.25],
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ReplayBuffer::new(0, Some(0)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn store_increments_count() {
        let mut buf = ReplayBuffer::new(10, Some(0)).unwrap();
        assert!(buf.is_empty());
        buf.store(transition(1.0));
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn wraps_and_keeps_counting() {
        let mut buf = ReplayBuffer::new(3, Some(0)).unwrap();
        for i in 0..7 {
            buf.store(transition(i as f64));
        }
        assert_eq!(buf.count(), 7);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.last(), Some(&transition(6.0)));
    }

    #[test]
    fn sample_only_returns_last_capacity_entries() {
        let mut buf = ReplayBuffer::new(4, Some(3)).unwrap();
        for i in 0..20 {
            buf.store(transition(i as f64));
        }
        let batch = buf.sample(64);
        assert_eq!(batch.len, 64);
        assert!(batch.rewards.iter().all(|&r| (16.0..20.0).contains(&r)));
    }

    #[test]
    fn sample_draws_with_replacement() {
        let mut buf = ReplayBuffer::new(100, Some(5)).unwrap();
        buf.store(transition(1.0));
        buf.store(transition(2.0));
        let batch = buf.sample(10);
        assert_eq!(batch.len, 10);
        assert_eq!(batch.states.len(), 10);
    }

    #[test]
    fn sample_empty_store_is_empty() {
        let mut buf = ReplayBuffer::new(5, Some(0)).unwrap();
        assert_eq!(buf.sample(4).len, 0);
    }

    #[test]
    fn sample_recent_returns_newest_in_order() {
        let mut buf = ReplayBuffer::new(5, Some(0)).unwrap();
        for i in 0..8 {
            buf.store(transition(i as f64));
        }
        let batch = buf.sample_recent(3);
        assert_eq!(batch.rewards, vec![5.0, 6.0, 7.0]);
        let all = buf.sample_recent(50);
        assert_eq!(all.rewards, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn capacity_one_holds_latest() {
        let mut buf = ReplayBuffer::new(1, Some(0)).unwrap();
        for i in 0..5 {
            buf.store(transition(i as f64));
        }
        assert_eq!(buf.len(), 1);
        let batch = buf.sample_recent(1);
        assert_eq!(batch.rewards, vec![4.0]);
        assert_eq!(batch.others_states, vec![4.5]);
        assert!(buf.has_enough(1));
        assert!(!buf.has_enough(2));
    }

    #[test]
    fn batch_to_tensors_shapes() {
        let mut buf = ReplayBuffer::new(8, Some(1)).unwrap();
        for i in 0..8 {
            buf.store(Transition {
                state: vec![i as f64, 0.0],
                action: vec![0.5],
                reward: 1.0,
                others_states: vec![0.1, 0.2, 0.3, 0.4],
                others_actions: vec![0.5, 0.6],
            });
        }
        let t = buf.sample(4).to_tensors(Device::Cpu);
        assert_eq!(t.states.size(), vec![4, 2]);
        assert_eq!(t.actions.size(), vec![4, 1]);
        assert_eq!(t.rewards.size(), vec![4, 1]);
        assert_eq!(t.others_states.size(), vec![4, 4]);
        assert_eq!(t.others_actions.size(), vec![4, 2]);
        assert_eq!(t.states.kind(), Kind::Float);
    }
}
