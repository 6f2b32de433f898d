//! A single MADDPG agent: actor/critic pair, target twins and exploration.

use std::path::PathBuf;

use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};

use super::config::MaddpgConfig;
use super::network::{all_finite, soft_update, ActorNetwork, CriticNetwork, NetworkMode};
use super::noise::ExplorationNoise;
use super::types::AgentId;
use crate::error::{CheckpointError, Result};

/// Saved parameters of an agent's four networks, in
/// actor, target actor, critic, target critic order.
pub(crate) struct ParameterSnapshot(Vec<Vec<(String, Tensor)>>);

/// Decentralized actor with a centralized critic.
///
/// The target networks start as exact copies of the live networks and then
/// track them through [`Agent::update_targets`]. They are frozen and stay in
/// eval mode for their whole lifetime.
pub struct Agent {
    id: AgentId,
    pub(crate) actor: ActorNetwork,
    pub(crate) critic: CriticNetwork,
    pub(crate) target_actor: ActorNetwork,
    pub(crate) target_critic: CriticNetwork,
    pub(crate) actor_opt: nn::Optimizer,
    pub(crate) critic_opt: nn::Optimizer,
    noise: ExplorationNoise,
    tau: f64,
    gamma: f64,
    device: Device,
}

impl Agent {
    /// Creates a new agent and hard-copies the live networks into the targets.
    pub fn new(id: AgentId, config: &MaddpgConfig, device: Device) -> Result<Self> {
        let actor = ActorNetwork::new("actor", config, device);
        let critic = CriticNetwork::new("critic", config, device);
        let mut target_actor = ActorNetwork::new("target_actor", config, device);
        let mut target_critic = CriticNetwork::new("target_critic", config, device);
        target_actor.var_store_mut().freeze();
        target_critic.var_store_mut().freeze();
        target_actor.set_mode(NetworkMode::Eval);
        target_critic.set_mode(NetworkMode::Eval);

        let actor_opt = nn::Adam::default().build(actor.var_store(), config.lr_actor)?;
        let critic_opt = nn::Adam::default().build(critic.var_store(), config.lr_critic)?;

        let noise_seed = config.seed.map(|s| s.wrapping_add(1 + id.0 as u64));
        let mut agent = Self {
            id,
            actor,
            critic,
            target_actor,
            target_critic,
            actor_opt,
            critic_opt,
            noise: ExplorationNoise::new(config.noise_std, config.total_episodes, noise_seed),
            tau: config.tau,
            gamma: config.gamma,
            device,
        };
        agent.update_targets(Some(1.0))?;
        Ok(agent)
    }

    /// Selects an action for `observation`.
    ///
    /// Outside evaluation a single Gaussian draw, scaled by the noise decay at
    /// `episode`, is added to every action component. The result is always
    /// clamped to `[0, 1]`.
    pub fn choose_action(
        &mut self,
        observation: &[f64],
        episode: usize,
        evaluation: bool,
    ) -> Result<Vec<f64>> {
        self.actor.set_mode(NetworkMode::Eval);
        let obs = Tensor::from_slice(observation)
            .view([1, -1])
            .to_kind(Kind::Float)
            .to_device(self.device);
        let mut action = tch::no_grad(|| self.actor.forward(&obs));

        if !evaluation {
            action = action + self.noise.sample(episode);
        }
        let action = action.clamp(0.0, 1.0);
        self.actor.set_mode(NetworkMode::Train);

        let values = Vec::<f32>::try_from(action.view([-1]).to_device(Device::Cpu))?;
        Ok(values.into_iter().map(f64::from).collect())
    }

    /// Soft-updates both target networks; `None` uses the configured τ.
    pub fn update_targets(&mut self, tau: Option<f64>) -> Result<()> {
        let tau = tau.unwrap_or(self.tau);
        soft_update(
            self.target_critic.var_store_mut(),
            self.critic.var_store(),
            tau,
        )?;
        soft_update(
            self.target_actor.var_store_mut(),
            self.actor.var_store(),
            tau,
        )?;
        Ok(())
    }

    /// Saves all four networks under `tag`.
    pub fn save(&self, tag: &str) -> Result<()> {
        self.actor.save(tag)?;
        self.target_actor.save(tag)?;
        self.critic.save(tag)?;
        self.target_critic.save(tag)?;
        tracing::info!(agent = %self.id, tag, "saved agent checkpoint");
        Ok(())
    }

    /// Restores all four networks saved under `tag`.
    ///
    /// Either every network is restored or none is: a missing file is
    /// reported before anything is read, and a file that fails to load
    /// rolls the agent back to its previous parameters.
    pub fn load(&mut self, tag: &str) -> Result<()> {
        self.ensure_checkpoint(tag)?;
        let snapshot = self.snapshot();
        if let Err(err) = self.load_networks(tag) {
            self.restore(&snapshot);
            return Err(err);
        }
        tracing::info!(agent = %self.id, tag, "loaded agent checkpoint");
        Ok(())
    }

    pub(crate) fn load_networks(&mut self, tag: &str) -> Result<()> {
        self.actor.load(tag)?;
        self.target_actor.load(tag)?;
        self.critic.load(tag)?;
        self.target_critic.load(tag)?;
        Ok(())
    }

    /// Files written by [`save`](Self::save) for `tag`.
    pub fn checkpoint_files(&self, tag: &str) -> [PathBuf; 4] {
        [
            self.actor.checkpoint_file(tag),
            self.target_actor.checkpoint_file(tag),
            self.critic.checkpoint_file(tag),
            self.target_critic.checkpoint_file(tag),
        ]
    }

    /// Fails with [`CheckpointError::Missing`] on the first absent file.
    pub fn ensure_checkpoint(&self, tag: &str) -> Result<()> {
        match self.checkpoint_files(tag).into_iter().find(|p| !p.exists()) {
            Some(path) => Err(CheckpointError::Missing { path }.into()),
            None => Ok(()),
        }
    }

    fn var_stores(&self) -> [&nn::VarStore; 4] {
        [
            self.actor.var_store(),
            self.target_actor.var_store(),
            self.critic.var_store(),
            self.target_critic.var_store(),
        ]
    }

    /// Deep copy of every network parameter.
    pub(crate) fn snapshot(&self) -> ParameterSnapshot {
        tch::no_grad(|| {
            let stores: Vec<Vec<(String, Tensor)>> = self
                .var_stores()
                .iter()
                .map(|vs| {
                    vs.variables()
                        .into_iter()
                        .map(|(name, t)| (name, t.copy()))
                        .collect()
                })
                .collect();
            ParameterSnapshot(stores)
        })
    }

    /// Writes `snapshot` back into the networks in place.
    pub(crate) fn restore(&mut self, snapshot: &ParameterSnapshot) {
        tch::no_grad(|| {
            for (vs, saved) in self.var_stores().iter().zip(&snapshot.0) {
                let mut vars = vs.variables();
                for (name, value) in saved {
                    if let Some(var) = vars.get_mut(name) {
                        var.copy_(value);
                    }
                }
            }
        });
    }

    /// Returns true when no parameter of any network is NaN or infinite.
    pub fn parameters_finite(&self) -> bool {
        all_finite(self.actor.var_store())
            && all_finite(self.critic.var_store())
            && all_finite(self.target_actor.var_store())
            && all_finite(self.target_critic.var_store())
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn noise(&self) -> &ExplorationNoise {
        &self.noise
    }

    pub fn actor(&self) -> &ActorNetwork {
        &self.actor
    }

    pub fn critic(&self) -> &CriticNetwork {
        &self.critic
    }

    pub fn target_actor(&self) -> &ActorNetwork {
        &self.target_actor
    }

    pub fn target_critic(&self) -> &CriticNetwork {
        &self.target_critic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MaddpgError;

    fn config() -> MaddpgConfig {
        MaddpgConfig {
            fc1_dims: 16,
            fc2_dims: 16,
            total_episodes: 100,
            noise_std: 0.2,
            seed: Some(11),
            ..MaddpgConfig::default()
        }
    }

    fn params_equal(a: &nn::VarStore, b: &nn::VarStore) -> bool {
        let b_vars = b.variables();
        a.variables().iter().all(|(name, t)| t.equal(&b_vars[name]))
    }

    #[test]
    fn targets_start_as_exact_copies() {
        let agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        assert!(params_equal(
            agent.actor().var_store(),
            agent.target_actor().var_store()
        ));
        assert!(params_equal(
            agent.critic().var_store(),
            agent.target_critic().var_store()
        ));
    }

    #[test]
    fn evaluation_is_deterministic_and_ignores_episode() {
        let mut agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        let a = agent.choose_action(&[0.7], 0, true).unwrap();
        let b = agent.choose_action(&[0.7], 99, true).unwrap();
        let c = agent.choose_action(&[0.7], 5_000, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn no_noise_at_final_episode() {
        let mut agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        let clean = agent.choose_action(&[0.4], 0, true).unwrap();
        for _ in 0..10 {
            assert_eq!(agent.choose_action(&[0.4], 100, false).unwrap(), clean);
            assert_eq!(agent.choose_action(&[0.4], 150, false).unwrap(), clean);
        }
    }

    #[test]
    fn noise_applied_at_first_episode() {
        let mut agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        let clean = agent.choose_action(&[0.4], 0, true).unwrap();
        let noisy: Vec<Vec<f64>> = (0..20)
            .map(|_| agent.choose_action(&[0.4], 0, false).unwrap())
            .collect();
        assert!(noisy.iter().any(|a| a != &clean));
    }

    #[test]
    fn actions_always_clamped() {
        let cfg = MaddpgConfig {
            noise_std: 50.0,
            ..config()
        };
        let mut agent = Agent::new(AgentId(1), &cfg, Device::Cpu).unwrap();
        for _ in 0..50 {
            let action = agent.choose_action(&[0.9], 0, false).unwrap();
            assert!(action.iter().all(|&a| (0.0..=1.0).contains(&a)));
        }
    }

    #[test]
    fn targets_stay_in_eval_mode() {
        let agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        assert_eq!(agent.target_actor().mode(), NetworkMode::Eval);
        assert_eq!(agent.target_critic().mode(), NetworkMode::Eval);
    }

    #[test]
    fn choose_action_restores_train_mode() {
        let mut agent = Agent::new(AgentId(0), &config(), Device::Cpu).unwrap();
        agent.choose_action(&[0.2], 0, true).unwrap();
        assert_eq!(agent.actor().mode(), NetworkMode::Train);
    }

    #[test]
    fn save_and_load_all_networks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..config()
        };
        let agent = Agent::new(AgentId(0), &cfg, Device::Cpu).unwrap();
        agent.save("ep10").unwrap();
        assert!(dir.path().join("actor/actor_ep10").exists());
        assert!(dir.path().join("actor/target_actor_ep10").exists());
        assert!(dir.path().join("critic/critic_ep10").exists());
        assert!(dir.path().join("critic/target_critic_ep10").exists());

        let mut other = Agent::new(AgentId(0), &cfg, Device::Cpu).unwrap();
        other.load("ep10").unwrap();
        assert!(params_equal(
            agent.critic().var_store(),
            other.critic().var_store()
        ));
        assert!(params_equal(
            agent.target_actor().var_store(),
            other.target_actor().var_store()
        ));
    }

    #[test]
    fn load_missing_tag_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..config()
        };
        let mut agent = Agent::new(AgentId(0), &cfg, Device::Cpu).unwrap();
        assert!(agent.load("nope").is_err());
    }

    #[test]
    fn load_with_one_missing_file_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..config()
        };
        let saved = Agent::new(AgentId(0), &cfg, Device::Cpu).unwrap();
        saved.save("ep3").unwrap();
        let removed = dir.path().join("critic/target_critic_ep3");
        std::fs::remove_file(&removed).unwrap();

        let mut agent = Agent::new(
            AgentId(0),
            &MaddpgConfig {
                seed: Some(12),
                ..cfg
            },
            Device::Cpu,
        )
        .unwrap();
        let before = agent.choose_action(&[0.3], 0, true).unwrap();
        let err = agent.load("ep3").unwrap_err();
        assert!(matches!(
            err,
            MaddpgError::Checkpoint(CheckpointError::Missing { ref path }) if *path == removed
        ));
        assert_eq!(agent.choose_action(&[0.3], 0, true).unwrap(), before);
    }

    #[test]
    fn corrupt_file_rolls_back_loaded_networks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..config()
        };
        let saved = Agent::new(AgentId(0), &cfg, Device::Cpu).unwrap();
        saved.save("ep4").unwrap();
        std::fs::write(dir.path().join("critic/critic_ep4"), b"not a tensor file").unwrap();

        let mut agent = Agent::new(
            AgentId(0),
            &MaddpgConfig {
                seed: Some(13),
                ..cfg
            },
            Device::Cpu,
        )
        .unwrap();
        let actor_before = agent.snapshot();
        assert!(agent.load("ep4").is_err());
        // actor and target actor loaded before the critic failed
        let vars = agent.actor().var_store().variables();
        for (name, old) in &actor_before.0[0] {
            assert!(old.equal(&vars[name]), "{name} was not rolled back");
        }
        assert!(!params_equal(
            saved.actor().var_store(),
            agent.actor().var_store()
        ));
    }
}
