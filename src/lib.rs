//! bidlearn - multi-agent actor-critic learning for sealed-bid auctions
//!
//! Agents learn bidding strategies against each other with MADDPG: every
//! agent has its own actor and a centralized critic that sees the joint
//! state/action of all bidders. The [`auction`] module provides the games
//! they play.

pub mod algorithms;
pub mod auction;
pub mod error;

pub use algorithms::maddpg::{
    Agent, AgentId, Horizon, LearnReport, LearnStats, MADDPGTrainer, MaddpgConfig, OthersLayout,
    Transition,
};
pub use auction::{AuctionEnv, AuctionRound};
pub use error::{AuctionError, CheckpointError, ConfigError, MaddpgError, Result};
