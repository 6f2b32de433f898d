//! Multi-agent deep deterministic policy gradient (MADDPG).
//!
//! Each agent owns a decentralized actor that sees only its own observation
//! and a centralized critic that scores the joint state/action of every
//! agent. Target twins of both networks track the live networks through
//! soft updates and supply the bootstrapped critic targets.
//!
//! The [`MADDPGTrainer`] owns the agents and their replay stores. Which other
//! agent fills which column of a critic input is fixed by that agent's
//! [`OthersLayout`], both when transitions are stored and when target actions
//! are recomputed during learning.

pub mod agent;
pub mod config;
pub mod network;
pub mod noise;
pub mod training;
pub mod types;

pub use agent::Agent;
pub use config::MaddpgConfig;
pub use network::{ActorNetwork, CriticNetwork, NetworkMode};
pub use noise::ExplorationNoise;
pub use training::{
    Horizon, LearnReport, LearnStats, MADDPGTrainer, ReplayBuffer, Transition, TransitionBatch,
};
pub use types::{AgentId, OthersLayout};
