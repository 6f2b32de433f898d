use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while persisting or restoring network parameters.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to create checkpoint directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to save checkpoint {path}: {source}")]
    Save {
        path: PathBuf,
        source: tch::TchError,
    },

    #[error("failed to load checkpoint {path}: {source}")]
    Load {
        path: PathBuf,
        source: tch::TchError,
    },

    #[error("checkpoint file {path} does not exist")]
    Missing { path: PathBuf },
}

/// Errors raised while loading or validating a [`MaddpgConfig`](crate::MaddpgConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[cfg(feature = "serde")]
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// Errors raised by the auction environments.
#[derive(Debug, Error, PartialEq)]
pub enum AuctionError {
    #[error("{auction} expects {expected} bids, got {actual}")]
    BidCount {
        auction: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{auction} round carries no common value")]
    MissingCommonValue { auction: &'static str },
}

/// Top-level error for the multi-agent learner.
#[derive(Debug, Error)]
pub enum MaddpgError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("auction error: {0}")]
    Auction(#[from] AuctionError),

    #[error("tensor error: {0}")]
    Tensor(#[from] tch::TchError),

    #[error("unknown agent {index} (trainer has {n_agents} agents)")]
    UnknownAgent { index: usize, n_agents: usize },

    #[error("{field} has width {actual}, expected {expected}")]
    TransitionShape {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("target network has no parameter named {0}")]
    ParameterMismatch(String),
}

pub type Result<T> = std::result::Result<T, MaddpgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_agent_display() {
        let err = MaddpgError::UnknownAgent {
            index: 4,
            n_agents: 2,
        };
        assert_eq!(err.to_string(), "unknown agent 4 (trainer has 2 agents)");
    }

    #[test]
    fn transition_shape_display() {
        let err = MaddpgError::TransitionShape {
            field: "others_states",
            expected: 2,
            actual: 3,
        };
        assert_eq!(err.to_string(), "others_states has width 3, expected 2");
    }

    #[test]
    fn bid_count_display() {
        let err = AuctionError::BidCount {
            auction: "first-price",
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "first-price expects 3 bids, got 2");
    }

    #[test]
    fn missing_checkpoint_display() {
        let err = CheckpointError::Missing {
            path: PathBuf::from("ckpt/actor/actor_agent1_best"),
        };
        assert_eq!(
            err.to_string(),
            "checkpoint file ckpt/actor/actor_agent1_best does not exist"
        );
    }

    #[test]
    fn config_error_converts() {
        let err: MaddpgError = ConfigError::Validation("tau must be in (0, 1]".into()).into();
        assert_eq!(
            err.to_string(),
            "config error: config validation error: tau must be in (0, 1]"
        );
    }
}
