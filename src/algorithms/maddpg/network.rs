//! Actor and critic networks using tch-rs (PyTorch bindings).
//!
//! Both networks are two-hidden-layer MLPs with ReLU activations. The actor
//! squashes its output through a sigmoid so bids land in `[0, 1]`; the critic
//! ends in a linear layer of width 1.

use std::path::{Path, PathBuf};

use tch::{
    nn::{self, Init, ModuleT},
    Device, Tensor,
};

use super::config::MaddpgConfig;
use crate::error::{CheckpointError, MaddpgError, Result};

/// Scale applied to the actor's output layer initialisation.
const ACTOR_OUTPUT_INIT_SCALE: f64 = 0.003;

/// Train/eval flag forwarded to the layers on every pass.
///
/// Plain linear layers ignore it; it is threaded through so mode-sensitive
/// layers behave correctly if added later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Train,
    Eval,
}

impl NetworkMode {
    fn is_train(self) -> bool {
        matches!(self, NetworkMode::Train)
    }
}

/// Checkpoint location: `{dir}/{role}/{name}_{tag}`.
fn checkpoint_path(dir: &Path, role: &str, name: &str, tag: &str) -> PathBuf {
    dir.join(role).join(format!("{name}_{tag}"))
}

fn save_var_store(vs: &nn::VarStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| CheckpointError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    vs.save(path).map_err(|source| CheckpointError::Save {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "saved checkpoint");
    Ok(())
}

fn load_var_store(vs: &mut nn::VarStore, path: &Path) -> Result<()> {
    tracing::info!(path = %path.display(), "loading checkpoint");
    vs.load(path).map_err(|source| CheckpointError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Uniform `±scale / sqrt(fan_in)` initialisation for weights and biases.
fn bounded_linear(p: nn::Path, fan_in: i64, fan_out: i64, scale: f64) -> nn::Linear {
    let limit = scale / (fan_in as f64).sqrt();
    let init = Init::Uniform {
        lo: -limit,
        up: limit,
    };
    let config = nn::LinearConfig {
        ws_init: init,
        bs_init: Some(init),
        bias: true,
    };
    nn::linear(p, fan_in, fan_out, config)
}

/// Blends `source` into `target`: `target ← τ·source + (1 − τ)·target`.
///
/// `tau >= 1` is a hard copy, so the target becomes bit-identical to the
/// source.
pub fn soft_update(target: &mut nn::VarStore, source: &nn::VarStore, tau: f64) -> Result<()> {
    if tau >= 1.0 {
        target.copy(source)?;
        return Ok(());
    }
    let source_vars = source.variables();
    tch::no_grad(|| {
        for (name, mut target_var) in target.variables() {
            let source_var = source_vars
                .get(&name)
                .ok_or_else(|| MaddpgError::ParameterMismatch(name.clone()))?;
            let blended = source_var * tau + &target_var * (1.0 - tau);
            target_var.copy_(&blended);
        }
        Ok(())
    })
}

/// Returns `true` when every parameter of `vs` is finite.
pub fn all_finite(vs: &nn::VarStore) -> bool {
    vs.variables().values().all(|t| {
        t.isfinite()
            .all()
            .to_kind(tch::Kind::Int64)
            .int64_value(&[])
            != 0
    })
}

/// Policy network: `state_dim → fc1 → fc2 → action_dim`, sigmoid output.
pub struct ActorNetwork {
    vs: nn::VarStore,
    net: nn::SequentialT,
    name: String,
    checkpoint_dir: PathBuf,
    mode: NetworkMode,
}

impl ActorNetwork {
    /// Creates a new actor.
    ///
    /// # Arguments
    ///
    /// * `name` - Network name, used as the checkpoint file prefix
    /// * `config` - Layer widths and checkpoint directory
    /// * `device` - Device to run on (CPU or CUDA)
    pub fn new(name: &str, config: &MaddpgConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let state_dim = config.state_dim as i64;
        let fc1 = config.fc1_dims as i64;
        let fc2 = config.fc2_dims as i64;
        let action_dim = config.action_dim as i64;

        let net = nn::seq_t()
            .add(bounded_linear(p / "fc1", state_dim, fc1, 1.0))
            .add_fn(|x| x.relu())
            .add(bounded_linear(p / "fc2", fc1, fc2, 1.0))
            .add_fn(|x| x.relu())
            .add(bounded_linear(
                p / "mu",
                fc2,
                action_dim,
                ACTOR_OUTPUT_INIT_SCALE,
            ))
            .add_fn(|x| x.sigmoid());

        Self {
            vs,
            net,
            name: name.to_string(),
            checkpoint_dir: config.checkpoint_dir.clone(),
            mode: NetworkMode::Train,
        }
    }

    /// Forward pass: `[B, state_dim] → [B, action_dim]`, values in `[0, 1]`.
    pub fn forward(&self, state: &Tensor) -> Tensor {
        self.net.forward_t(state, self.mode.is_train())
    }

    /// Sets the train/eval mode.
    pub fn set_mode(&mut self, mode: NetworkMode) {
        self.mode = mode;
    }

    /// Returns the current train/eval mode.
    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checkpoint file for `tag`.
    pub fn checkpoint_file(&self, tag: &str) -> PathBuf {
        checkpoint_path(&self.checkpoint_dir, "actor", &self.name, tag)
    }

    /// Saves all parameters under `tag`.
    pub fn save(&self, tag: &str) -> Result<()> {
        save_var_store(&self.vs, &self.checkpoint_file(tag))
    }

    /// Restores all parameters saved under `tag`.
    pub fn load(&mut self, tag: &str) -> Result<()> {
        let path = self.checkpoint_file(tag);
        load_var_store(&mut self.vs, &path)
    }

    /// Returns a mutable reference to the variable store for optimization.
    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    /// Returns a reference to the variable store.
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

/// Centralized value network over the joint state/action.
///
/// Input layout: `[own state, own action, others' states, others' actions]`.
/// The others' blocks may include phantom slots, so the input width is fixed
/// by [`MaddpgConfig::critic_input_dim`] at construction.
pub struct CriticNetwork {
    vs: nn::VarStore,
    net: nn::SequentialT,
    name: String,
    checkpoint_dir: PathBuf,
    mode: NetworkMode,
    input_dim: i64,
}

impl CriticNetwork {
    /// Creates a new critic.
    pub fn new(name: &str, config: &MaddpgConfig, device: Device) -> Self {
        let vs = nn::VarStore::new(device);
        let p = &vs.root();
        let input_dim = config.critic_input_dim() as i64;
        let fc1 = config.fc1_dims as i64;
        let fc2 = config.fc2_dims as i64;

        let net = nn::seq_t()
            .add(nn::linear(p / "fc1", input_dim, fc1, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "fc2", fc1, fc2, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(p / "q", fc2, 1, Default::default()));

        Self {
            vs,
            net,
            name: name.to_string(),
            checkpoint_dir: config.checkpoint_dir.clone(),
            mode: NetworkMode::Train,
            input_dim,
        }
    }

    /// Forward pass: returns `[B, 1]` value estimates.
    pub fn forward(
        &self,
        state: &Tensor,
        action: &Tensor,
        others_states: &Tensor,
        others_actions: &Tensor,
    ) -> Tensor {
        let inputs = Tensor::cat(&[state, action, others_states, others_actions], 1);
        self.net.forward_t(&inputs, self.mode.is_train())
    }

    /// Width of the concatenated input.
    pub fn input_dim(&self) -> i64 {
        self.input_dim
    }

    /// Sets the train/eval mode.
    pub fn set_mode(&mut self, mode: NetworkMode) {
        self.mode = mode;
    }

    /// Returns the current train/eval mode.
    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checkpoint file for `tag`.
    pub fn checkpoint_file(&self, tag: &str) -> PathBuf {
        checkpoint_path(&self.checkpoint_dir, "critic", &self.name, tag)
    }

    /// Saves all parameters under `tag`.
    pub fn save(&self, tag: &str) -> Result<()> {
        save_var_store(&self.vs, &self.checkpoint_file(tag))
    }

    /// Restores all parameters saved under `tag`.
    pub fn load(&mut self, tag: &str) -> Result<()> {
        let path = self.checkpoint_file(tag);
        load_var_store(&mut self.vs, &path)
    }

    /// Returns a mutable reference to the variable store for optimization.
    pub fn var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.vs
    }

    /// Returns a reference to the variable store.
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn small_config() -> MaddpgConfig {
        MaddpgConfig {
            fc1_dims: 8,
            fc2_dims: 8,
            ..MaddpgConfig::default()
        }
    }

    fn max_abs_diff(a: &nn::VarStore, b: &nn::VarStore) -> f64 {
        let b_vars = b.variables();
        a.variables()
            .iter()
            .map(|(name, t)| (t - &b_vars[name]).abs().max().double_value(&[]))
            .fold(0.0, f64::max)
    }

    #[test]
    fn actor_forward_shape_and_range() {
        let actor = ActorNetwork::new("actor", &small_config(), Device::Cpu);
        let obs = Tensor::randn([16, 1], (Kind::Float, Device::Cpu)) * 10.0;
        let out = actor.forward(&obs);
        assert_eq!(out.size(), vec![16, 1]);
        assert!(out.min().double_value(&[]) >= 0.0);
        assert!(out.max().double_value(&[]) <= 1.0);
    }

    #[test]
    fn actor_output_layer_starts_small() {
        let actor = ActorNetwork::new("actor", &small_config(), Device::Cpu);
        let vars = actor.var_store().variables();
        let limit = ACTOR_OUTPUT_INIT_SCALE / 8f64.sqrt();
        assert!(vars["mu.weight"].abs().max().double_value(&[]) <= limit + 1e-9);
        assert!(vars["mu.bias"].abs().max().double_value(&[]) <= limit + 1e-9);
    }

    #[test]
    fn critic_forward_shape() {
        let cfg = MaddpgConfig {
            n_agents: 3,
            ..small_config()
        };
        let critic = CriticNetwork::new("critic", &cfg, Device::Cpu);
        assert_eq!(critic.input_dim(), 6);
        let s = Tensor::rand([5, 1], (Kind::Float, Device::Cpu));
        let a = Tensor::rand([5, 1], (Kind::Float, Device::Cpu));
        let os = Tensor::rand([5, 2], (Kind::Float, Device::Cpu));
        let oa = Tensor::rand([5, 2], (Kind::Float, Device::Cpu));
        assert_eq!(critic.forward(&s, &a, &os, &oa).size(), vec![5, 1]);
    }

    #[test]
    fn critic_widened_for_phantoms() {
        let cfg = MaddpgConfig {
            transfer_learning: true,
            phantom_players: 3,
            ..small_config()
        };
        let critic = CriticNetwork::new("critic", &cfg, Device::Cpu);
        assert_eq!(critic.input_dim(), 10);
    }

    #[test]
    fn hard_update_copies_exactly() {
        let cfg = small_config();
        let live = ActorNetwork::new("actor", &cfg, Device::Cpu);
        let mut target = ActorNetwork::new("target_actor", &cfg, Device::Cpu);
        assert!(max_abs_diff(live.var_store(), target.var_store()) > 0.0);

        soft_update(target.var_store_mut(), live.var_store(), 1.0).unwrap();
        assert_eq!(max_abs_diff(live.var_store(), target.var_store()), 0.0);
    }

    #[test]
    fn zero_tau_leaves_target_unchanged() {
        let cfg = small_config();
        let live = CriticNetwork::new("critic", &cfg, Device::Cpu);
        let mut target = CriticNetwork::new("target_critic", &cfg, Device::Cpu);
        let before: Vec<(String, Tensor)> = target
            .var_store()
            .variables()
            .into_iter()
            .map(|(n, t)| (n, t.copy()))
            .collect();

        soft_update(target.var_store_mut(), live.var_store(), 0.0).unwrap();

        let after = target.var_store().variables();
        for (name, old) in before {
            assert!(old.equal(&after[&name]), "{name} changed");
        }
    }

    #[test]
    fn partial_update_moves_toward_source() {
        let cfg = small_config();
        let live = ActorNetwork::new("actor", &cfg, Device::Cpu);
        let mut target = ActorNetwork::new("target_actor", &cfg, Device::Cpu);
        let before = max_abs_diff(live.var_store(), target.var_store());
        soft_update(target.var_store_mut(), live.var_store(), 0.5).unwrap();
        let after = max_abs_diff(live.var_store(), target.var_store());
        assert!((after - before * 0.5).abs() < 1e-6);
    }

    #[test]
    fn checkpoint_path_layout() {
        let cfg = MaddpgConfig {
            checkpoint_dir: PathBuf::from("ckpt"),
            ..small_config()
        };
        let actor = ActorNetwork::new("target_actor", &cfg, Device::Cpu);
        let critic = CriticNetwork::new("critic", &cfg, Device::Cpu);
        assert_eq!(
            actor.checkpoint_file("best"),
            PathBuf::from("ckpt/actor/target_actor_best")
        );
        assert_eq!(
            critic.checkpoint_file("best"),
            checkpoint_path(Path::new("ckpt"), "critic", "critic", "best")
        );
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..small_config()
        };
        let actor = ActorNetwork::new("actor", &cfg, Device::Cpu);
        actor.save("t0").unwrap();

        let mut restored = ActorNetwork::new("actor", &cfg, Device::Cpu);
        restored.load("t0").unwrap();
        assert_eq!(max_abs_diff(actor.var_store(), restored.var_store()), 0.0);
    }

    #[test]
    fn load_missing_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MaddpgConfig {
            checkpoint_dir: dir.path().to_path_buf(),
            ..small_config()
        };
        let mut critic = CriticNetwork::new("critic", &cfg, Device::Cpu);
        let err = critic.load("missing").unwrap_err();
        assert!(matches!(
            err,
            MaddpgError::Checkpoint(CheckpointError::Load { .. })
        ));
    }

    #[test]
    fn fresh_networks_are_finite() {
        let critic = CriticNetwork::new("critic", &small_config(), Device::Cpu);
        assert!(all_finite(critic.var_store()));
    }
}
