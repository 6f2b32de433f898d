//! Learning algorithms.

pub mod maddpg;

pub use maddpg::{MADDPGTrainer, MaddpgConfig};
