//! Hyperparameters for the MADDPG learner.

#[cfg(feature = "serde")]
use std::path::Path;
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration shared by every agent of a [`MADDPGTrainer`](super::MADDPGTrainer).
///
/// All fields have defaults, so a partial TOML file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MaddpgConfig {
    // --- Optimisation ---
    /// Actor learning rate (α).
    pub lr_actor: f64,
    /// Critic learning rate (β).
    pub lr_critic: f64,
    /// Soft-update rate τ for the target networks.
    pub tau: f64,
    /// Discount factor γ applied to the bootstrapped critic value.
    pub gamma: f64,
    /// Number of transitions per learning step.
    pub batch_size: usize,

    // --- Geometry ---
    /// Number of real agents.
    pub n_agents: usize,
    /// Width of one agent's observation.
    pub state_dim: usize,
    /// Width of one agent's action.
    pub action_dim: usize,
    /// First hidden layer width.
    pub fc1_dims: usize,
    /// Second hidden layer width.
    pub fc2_dims: usize,

    // --- Exploration ---
    /// Planned number of episodes; noise reaches zero at this episode.
    pub total_episodes: usize,
    /// Initial exploration noise standard deviation.
    pub noise_std: f64,

    // --- Transfer learning ---
    /// Widens the critic input with phantom players when set.
    pub transfer_learning: bool,
    /// Number of phantom players appended to the critic input.
    pub phantom_players: usize,
    /// Position, among the other agents, of the agent duplicated into phantom slots.
    pub tile_source_column: usize,

    // --- Replay ---
    /// Capacity of each agent's long-horizon store.
    pub long_capacity: usize,
    /// Capacity of each agent's short-horizon store.
    pub short_capacity: usize,

    // --- Persistence / reproducibility ---
    /// Root directory for checkpoint files.
    pub checkpoint_dir: PathBuf,
    /// Seed for network initialisation, replay sampling and noise. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for MaddpgConfig {
    fn default() -> Self {
        Self {
            lr_actor: 0.000025,
            lr_critic: 0.00025,
            tau: 0.001,
            gamma: 0.99,
            batch_size: 64,
            n_agents: 2,
            state_dim: 1,
            action_dim: 1,
            fc1_dims: 64,
            fc2_dims: 64,
            total_episodes: 100_000,
            noise_std: 0.2,
            transfer_learning: false,
            phantom_players: 0,
            tile_source_column: 0,
            long_capacity: 1_000_000,
            short_capacity: 1,
            checkpoint_dir: PathBuf::from("models"),
            seed: None,
        }
    }
}

impl MaddpgConfig {
    /// Phantom slots actually appended to the critic input.
    ///
    /// Zero unless transfer learning is enabled.
    pub fn phantom_slots(&self) -> usize {
        if self.transfer_learning {
            self.phantom_players
        } else {
            0
        }
    }

    /// Width of the critic input: own and others' states and actions, phantoms included.
    pub fn critic_input_dim(&self) -> usize {
        (self.n_agents + self.phantom_slots()) * (self.state_dim + self.action_dim)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lr_actor <= 0.0 {
            return Err(ConfigError::Validation("lr_actor must be > 0".into()));
        }
        if self.lr_critic <= 0.0 {
            return Err(ConfigError::Validation("lr_critic must be > 0".into()));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(ConfigError::Validation("tau must be in (0, 1]".into()));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(ConfigError::Validation("gamma must be in [0, 1]".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be > 0".into()));
        }
        if self.n_agents < 2 {
            return Err(ConfigError::Validation("n_agents must be >= 2".into()));
        }
        if self.state_dim == 0 || self.action_dim == 0 {
            return Err(ConfigError::Validation(
                "state_dim and action_dim must be > 0".into(),
            ));
        }
        if self.fc1_dims == 0 || self.fc2_dims == 0 {
            return Err(ConfigError::Validation(
                "hidden layer widths must be > 0".into(),
            ));
        }
        if self.total_episodes == 0 {
            return Err(ConfigError::Validation("total_episodes must be > 0".into()));
        }
        if self.noise_std < 0.0 {
            return Err(ConfigError::Validation("noise_std must be >= 0".into()));
        }
        if self.long_capacity == 0 || self.short_capacity == 0 {
            return Err(ConfigError::Validation(
                "replay capacities must be > 0".into(),
            ));
        }
        if self.phantom_slots() > 0 && self.tile_source_column >= self.n_agents - 1 {
            return Err(ConfigError::Validation(format!(
                "tile_source_column {} out of range for {} other agents",
                self.tile_source_column,
                self.n_agents - 1
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    #[cfg(feature = "serde")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: MaddpgConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    #[cfg(feature = "serde")]
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Render the defaults as TOML.
    #[cfg(feature = "serde")]
    pub fn default_toml() -> String {
        toml::to_string_pretty(&MaddpgConfig::default()).unwrap_or_default()
    }
}
