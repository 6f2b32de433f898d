//! MADDPG coordinator.
//!
//! Owns every [`Agent`] together with its replay stores and runs the
//! per-agent learning step. Each critic sees the joint state/action of all
//! agents, while the target actions of the other agents are routed through
//! their own target actors using the owner's [`OthersLayout`].

use std::fmt;

use tch::{Device, Kind, Reduction, Tensor};

use super::buffer::{BatchTensors, ReplayBuffer, Transition};
use crate::algorithms::maddpg::agent::Agent;
use crate::algorithms::maddpg::config::MaddpgConfig;
use crate::algorithms::maddpg::network::NetworkMode;
use crate::algorithms::maddpg::types::{AgentId, OthersLayout};
use crate::error::{MaddpgError, Result};

/// Which of an agent's two replay stores a learning step draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Large store, uniform sampling with replacement.
    Long,
    /// Small store (capacity 1 by default), most recent entries only.
    Short,
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Long => write!(f, "long"),
            Horizon::Short => write!(f, "short"),
        }
    }
}

/// Losses from one learning step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnStats {
    pub critic_loss: f64,
    pub actor_loss: f64,
}

/// Outcome of [`MADDPGTrainer::learn`]. A `None` horizon was skipped because
/// its store did not hold `batch_size` entries yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LearnReport {
    pub long: Option<LearnStats>,
    pub short: Option<LearnStats>,
}

impl LearnReport {
    /// True when neither horizon ran.
    pub fn is_empty(&self) -> bool {
        self.long.is_none() && self.short.is_none()
    }
}

/// One agent's pair of replay stores.
#[derive(Debug)]
pub struct AgentMemory {
    long: ReplayBuffer,
    short: ReplayBuffer,
}

impl AgentMemory {
    fn new(config: &MaddpgConfig, index: usize) -> Result<Self> {
        let seed = |offset: u64| {
            config
                .seed
                .map(|s| s.wrapping_add(1_000 + 2 * index as u64 + offset))
        };
        Ok(Self {
            long: ReplayBuffer::new(config.long_capacity, seed(0))?,
            short: ReplayBuffer::new(config.short_capacity, seed(1))?,
        })
    }

    fn store(&mut self, transition: Transition) {
        self.short.store(transition.clone());
        self.long.store(transition);
    }

    /// Store for `horizon`.
    pub fn get(&self, horizon: Horizon) -> &ReplayBuffer {
        match horizon {
            Horizon::Long => &self.long,
            Horizon::Short => &self.short,
        }
    }

    fn get_mut(&mut self, horizon: Horizon) -> &mut ReplayBuffer {
        match horizon {
            Horizon::Long => &mut self.long,
            Horizon::Short => &mut self.short,
        }
    }
}

/// Read-only view of every agent except the one being updated.
struct OtherAgents<'a> {
    owner: usize,
    before: &'a [Agent],
    after: &'a [Agent],
}

impl<'a> OtherAgents<'a> {
    fn get(&self, id: AgentId) -> &'a Agent {
        if id.0 < self.owner {
            &self.before[id.0]
        } else {
            &self.after[id.0 - self.owner - 1]
        }
    }

    /// Target-actor actions of every stored slot, each fed its own block of
    /// `others_states`, concatenated in slot order.
    fn target_actions(
        &self,
        layout: &OthersLayout,
        others_states: &Tensor,
        state_dim: i64,
    ) -> Tensor {
        let actions: Vec<Tensor> = layout
            .stored_slots()
            .iter()
            .enumerate()
            .map(|(column, &id)| {
                let obs = others_states.narrow(1, column as i64 * state_dim, state_dim);
                self.get(id).target_actor.forward(&obs)
            })
            .collect();
        Tensor::cat(&actions, 1)
    }

    /// [`target_actions`](Self::target_actions) widened with the phantom
    /// slots, without gradient tracking.
    fn critic_target_actions(
        &self,
        layout: &OthersLayout,
        others_states: &Tensor,
        state_dim: i64,
        action_dim: i64,
    ) -> Tensor {
        tch::no_grad(|| {
            let stored = self.target_actions(layout, others_states, state_dim);
            layout.expand(&stored, action_dim)
        })
    }
}

/// Multi-agent DDPG trainer with decentralized actors and centralized critics.
///
/// # Example
///
/// ```no_run
/// use bidlearn::{MADDPGTrainer, MaddpgConfig};
/// use tch::Device;
///
/// let mut trainer = MADDPGTrainer::new(MaddpgConfig::default(), Device::Cpu)?;
/// let observations = vec![vec![0.4], vec![0.7]];
/// let actions = trainer.choose_actions(&observations, 0, false)?;
/// trainer.remember_joint(&observations, &actions, &[0.0, 0.3])?;
/// let _reports = trainer.learn_all()?;
/// # Ok::<(), bidlearn::MaddpgError>(())
/// ```
pub struct MADDPGTrainer {
    config: MaddpgConfig,
    agents: Vec<Agent>,
    layouts: Vec<OthersLayout>,
    memories: Vec<AgentMemory>,
    device: Device,
}

impl MADDPGTrainer {
    /// Creates a trainer with `config.n_agents` freshly initialised agents.
    ///
    /// # Arguments
    ///
    /// * `config` - Shared hyperparameters, validated before use
    /// * `device` - Compute device
    pub fn new(config: MaddpgConfig, device: Device) -> Result<Self> {
        config.validate()?;
        if let Some(seed) = config.seed {
            tch::manual_seed(seed as i64);
        }

        let mut agents = Vec::with_capacity(config.n_agents);
        let mut layouts = Vec::with_capacity(config.n_agents);
        let mut memories = Vec::with_capacity(config.n_agents);
        for index in 0..config.n_agents {
            let id = AgentId(index);
            agents.push(Agent::new(id, &config, device)?);
            layouts.push(OthersLayout::new(
                id,
                config.n_agents,
                config.phantom_slots(),
                config.tile_source_column,
            ));
            memories.push(AgentMemory::new(&config, index)?);
        }

        tracing::info!(
            n_agents = config.n_agents,
            ?device,
            critic_input_dim = config.critic_input_dim(),
            phantom_slots = config.phantom_slots(),
            "created MADDPG trainer"
        );

        Ok(Self {
            config,
            agents,
            layouts,
            memories,
            device,
        })
    }

    pub fn config(&self) -> &MaddpgConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn n_agents(&self) -> usize {
        self.agents.len()
    }

    /// Agent `id`.
    pub fn agent(&self, id: AgentId) -> Result<&Agent> {
        let index = self.check(id)?;
        Ok(&self.agents[index])
    }

    /// Column-routing map of agent `id`'s critic.
    pub fn layout(&self, id: AgentId) -> Result<&OthersLayout> {
        let index = self.check(id)?;
        Ok(&self.layouts[index])
    }

    /// Replay store of agent `id` for `horizon`.
    pub fn memory(&self, id: AgentId, horizon: Horizon) -> Result<&ReplayBuffer> {
        let index = self.check(id)?;
        Ok(self.memories[index].get(horizon))
    }

    fn check(&self, id: AgentId) -> Result<usize> {
        if id.0 < self.agents.len() {
            Ok(id.0)
        } else {
            Err(MaddpgError::UnknownAgent {
                index: id.0,
                n_agents: self.agents.len(),
            })
        }
    }

    fn check_count(&self, field: &'static str, actual: usize) -> Result<()> {
        if actual == self.agents.len() {
            Ok(())
        } else {
            Err(MaddpgError::TransitionShape {
                field,
                expected: self.agents.len(),
                actual,
            })
        }
    }

    /// Lets every agent pick an action for its own observation.
    pub fn choose_actions(
        &mut self,
        observations: &[Vec<f64>],
        episode: usize,
        evaluation: bool,
    ) -> Result<Vec<Vec<f64>>> {
        self.check_count("observations", observations.len())?;
        self.agents
            .iter_mut()
            .zip(observations)
            .map(|(agent, obs)| agent.choose_action(obs, episode, evaluation))
            .collect()
    }

    /// Stores `transition` in both of `owner`'s replay stores.
    ///
    /// `others_states` and `others_actions` must follow the owner's stored
    /// slot order (ascending agent index, owner excluded).
    pub fn remember(&mut self, owner: AgentId, transition: Transition) -> Result<()> {
        let index = self.check(owner)?;
        let others = self.layouts[index].stored_slots().len();
        let expect = |field: &'static str, expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(MaddpgError::TransitionShape {
                    field,
                    expected,
                    actual,
                })
            }
        };
        expect("state", self.config.state_dim, transition.state.len())?;
        expect("action", self.config.action_dim, transition.action.len())?;
        expect(
            "others_states",
            others * self.config.state_dim,
            transition.others_states.len(),
        )?;
        expect(
            "others_actions",
            others * self.config.action_dim,
            transition.others_actions.len(),
        )?;

        self.memories[index].store(transition);
        Ok(())
    }

    /// Records one joint step, writing each agent's own-perspective
    /// transition into that agent's stores.
    pub fn remember_joint(
        &mut self,
        observations: &[Vec<f64>],
        actions: &[Vec<f64>],
        rewards: &[f64],
    ) -> Result<()> {
        self.check_count("observations", observations.len())?;
        self.check_count("actions", actions.len())?;
        self.check_count("rewards", rewards.len())?;
        // every width is checked before any store is written
        check_widths("state", self.config.state_dim, observations)?;
        check_widths("action", self.config.action_dim, actions)?;

        let transitions: Vec<Transition> = self
            .layouts
            .iter()
            .enumerate()
            .map(|(index, layout)| Transition {
                state: observations[index].clone(),
                action: actions[index].clone(),
                reward: rewards[index],
                others_states: layout.gather(observations),
                others_actions: layout.gather(actions),
            })
            .collect();
        for (memory, transition) in self.memories.iter_mut().zip(transitions) {
            memory.store(transition);
        }
        Ok(())
    }

    /// Runs the long-horizon then the short-horizon learning step for `id`.
    /// Each step is gated on its own store.
    pub fn learn(&mut self, id: AgentId) -> Result<LearnReport> {
        Ok(LearnReport {
            long: self.learn_from(id, Horizon::Long)?,
            short: self.learn_from(id, Horizon::Short)?,
        })
    }

    /// Calls [`learn`](Self::learn) for every agent in index order.
    pub fn learn_all(&mut self) -> Result<Vec<LearnReport>> {
        (0..self.agents.len())
            .map(|index| self.learn(AgentId(index)))
            .collect()
    }

    /// One learning step for agent `id` against its `horizon` store.
    ///
    /// Returns `Ok(None)` without touching any network while the store holds
    /// fewer than `batch_size` entries.
    pub fn learn_from(&mut self, id: AgentId, horizon: Horizon) -> Result<Option<LearnStats>> {
        let index = self.check(id)?;
        let batch_size = self.config.batch_size;
        let store = self.memories[index].get_mut(horizon);
        if !store.has_enough(batch_size) {
            tracing::trace!(
                agent = %id,
                %horizon,
                available = store.len(),
                batch_size,
                "not enough samples, skipping learning step"
            );
            return Ok(None);
        }
        let batch = match horizon {
            Horizon::Long => store.sample(batch_size),
            Horizon::Short => store.sample_recent(batch_size),
        };
        let batch = batch.to_tensors(self.device);

        let (before, rest) = self.agents.split_at_mut(index);
        let Some((agent, after)) = rest.split_first_mut() else {
            return Err(MaddpgError::UnknownAgent {
                index,
                n_agents: before.len(),
            });
        };
        let others = OtherAgents {
            owner: index,
            before,
            after,
        };

        let stats = update_agent(
            agent,
            &others,
            &self.layouts[index],
            &batch,
            self.config.state_dim as i64,
            self.config.action_dim as i64,
        )?;

        tracing::debug!(
            agent = %id,
            %horizon,
            critic_loss = stats.critic_loss,
            actor_loss = stats.actor_loss,
            "learning step"
        );
        Ok(Some(stats))
    }

    /// Saves every agent under `agent{i}_{tag}`.
    pub fn save_checkpoint(&self, tag: &str) -> Result<()> {
        for agent in &self.agents {
            agent.save(&format!("{}_{tag}", agent.id()))?;
        }
        tracing::info!(tag, n_agents = self.agents.len(), "saved trainer checkpoint");
        Ok(())
    }

    /// Restores every agent saved by [`save_checkpoint`](Self::save_checkpoint).
    ///
    /// All agents are restored or none: missing files are reported before any
    /// agent is touched, and a failed load rolls every agent back.
    pub fn load_checkpoint(&mut self, tag: &str) -> Result<()> {
        for agent in &self.agents {
            agent.ensure_checkpoint(&format!("{}_{tag}", agent.id()))?;
        }
        let snapshots: Vec<_> = self.agents.iter().map(Agent::snapshot).collect();
        let loaded = self.agents.iter_mut().try_for_each(|agent| {
            let id = agent.id();
            agent.load_networks(&format!("{id}_{tag}"))
        });
        if let Err(err) = loaded {
            tracing::warn!(tag, error = %err, "checkpoint load failed, restoring parameters");
            for (agent, snapshot) in self.agents.iter_mut().zip(&snapshots) {
                agent.restore(snapshot);
            }
            return Err(err);
        }
        tracing::info!(tag, n_agents = self.agents.len(), "loaded trainer checkpoint");
        Ok(())
    }
}

fn check_widths(field: &'static str, expected: usize, rows: &[Vec<f64>]) -> Result<()> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(MaddpgError::TransitionShape {
            field,
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// Critic then actor update for one agent, followed by a soft target update.
fn update_agent(
    agent: &mut Agent,
    others: &OtherAgents<'_>,
    layout: &OthersLayout,
    batch: &BatchTensors,
    state_dim: i64,
    action_dim: i64,
) -> Result<LearnStats> {
    let states = &batch.states;
    let others_states = layout.expand(&batch.others_states, state_dim);
    let others_actions = layout.expand(&batch.others_actions, action_dim);
    let others_target_actions =
        others.critic_target_actions(layout, &batch.others_states, state_dim, action_dim);

    // Bootstrap from the same sampled state; samples are never terminal.
    agent.critic.set_mode(NetworkMode::Eval);
    let target_value = tch::no_grad(|| {
        let target_action = agent.target_actor.forward(states);
        agent
            .target_critic
            .forward(states, &target_action, &others_states, &others_target_actions)
    });
    let y = (&batch.rewards + target_value * agent.gamma()).detach();

    agent.critic.set_mode(NetworkMode::Train);
    let current = agent
        .critic
        .forward(states, &batch.actions, &others_states, &others_actions);
    let critic_loss = current.mse_loss(&y, Reduction::Mean);
    agent.critic_opt.zero_grad();
    critic_loss.backward();
    agent.critic_opt.step();

    agent.critic.set_mode(NetworkMode::Eval);
    agent.actor.set_mode(NetworkMode::Train);
    agent.actor_opt.zero_grad();
    let mu = agent.actor.forward(states);
    let actor_loss = -agent
        .critic
        .forward(states, &mu, &others_states, &others_target_actions)
        .mean(Kind::Float);
    actor_loss.backward();
    agent.actor_opt.step();
    agent.critic.set_mode(NetworkMode::Train);

    agent.update_targets(None)?;

    Ok(LearnStats {
        critic_loss: f64::try_from(&critic_loss)?,
        actor_loss: f64::try_from(&actor_loss)?,
    })
}
