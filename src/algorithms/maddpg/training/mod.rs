//! Training infrastructure for MADDPG.
//!
//! Provides the replay stores and the multi-agent coordinator.

pub mod buffer;
pub mod maddpg;


pub use buffer::{BatchTensors, ReplayBuffer, Transition, TransitionBatch};
pub use maddpg::{AgentMemory, Horizon, LearnReport, LearnStats, MADDPGTrainer};
