//! Agent identity and the column-routing map between agents.

use std::fmt;

use tch::Tensor;

/// Position of an agent in the trainer's agent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub usize);

impl AgentId {
    /// Returns the raw index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent{}", self.0)
    }
}

/// Which other agent feeds each slot of an agent's joint critic input.
///
/// The first `n_agents - 1` slots are the stored slots: every other agent in
/// ascending index order, owner excluded. This is the order in which
/// `others_states` / `others_actions` are written to the replay store. Any
/// remaining slots are phantom players that repeat the stored slot at
/// `tile_source_column`; they exist only in the critic input, never in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OthersLayout {
    owner: AgentId,
    slots: Vec<AgentId>,
    stored: usize,
    tile_source_column: usize,
}

impl OthersLayout {
    /// Builds the layout for `owner`.
    ///
    /// # Arguments
    ///
    /// * `owner` - Agent whose critic consumes this layout
    /// * `n_agents` - Number of real agents
    /// * `phantom_players` - Extra slots appended for transfer learning
    /// * `tile_source_column` - Stored slot duplicated into each phantom slot
    pub fn new(
        owner: AgentId,
        n_agents: usize,
        phantom_players: usize,
        tile_source_column: usize,
    ) -> Self {
        let mut slots: Vec<AgentId> = (0..n_agents)
            .filter(|&j| j != owner.0)
            .map(AgentId)
            .collect();
        let stored = slots.len();
        if phantom_players > 0 {
            let source = slots[tile_source_column];
            slots.extend(std::iter::repeat(source).take(phantom_players));
        }
        Self {
            owner,
            slots,
            stored,
            tile_source_column,
        }
    }

    /// Agent whose critic consumes this layout.
    pub fn owner(&self) -> AgentId {
        self.owner
    }

    /// All critic slots, phantoms included.
    pub fn slots(&self) -> &[AgentId] {
        &self.slots
    }

    /// Slots that are written to the replay store.
    pub fn stored_slots(&self) -> &[AgentId] {
        &self.slots[..self.stored]
    }

    /// Number of phantom slots.
    pub fn phantom_count(&self) -> usize {
        self.slots.len() - self.stored
    }

    /// Concatenates the per-agent vectors of every stored slot, in slot order.
    pub fn gather(&self, per_agent: &[Vec<f64>]) -> Vec<f64> {
        self.stored_slots()
            .iter()
            .flat_map(|id| per_agent[id.0].iter().copied())
            .collect()
    }

    /// Extends a `[B, stored * width]` tensor with the phantom slots, giving
    /// `[B, slots * width]`.
    pub fn expand(&self, stored: &Tensor, width: i64) -> Tensor {
        let phantoms = self.phantom_count();
        if phantoms == 0 {
            return stored.shallow_clone();
        }
        let source = stored.narrow(1, self.tile_source_column as i64 * width, width);
        let tiled = source.repeat([1, phantoms as i64]);
        Tensor::cat(&[stored.shallow_clone(), tiled], 1)
    }
}
