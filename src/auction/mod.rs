//! Auction games the agents bid in.
//!
//! Every environment follows the same two-call contract: [`AuctionEnv::reset`]
//! draws a fresh round of private values or signals, and
//! [`AuctionEnv::step`] maps the joint bid vector to one reward per player.
//! Bids are expected in `[0, 1]`, the range of the actor output.
//!
//! Ties among the highest bids are broken uniformly at random.

pub mod common_value;
pub mod core_selecting;
pub mod private_value;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::AuctionError;

pub use common_value::{CommonValueAuction, CommonValueRule};
pub use core_selecting::CoreSelectingAuction;
pub use private_value::{Payment, PrivateValueAuction, TariffDiscountAuction, ValueDistribution};

/// One draw of the environment state.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRound {
    /// Per-player private value, cost or signal; each player observes only its own.
    pub signals: Vec<f64>,
    /// Value shared by all players, for common-value games.
    pub common_value: Option<f64>,
}

impl AuctionRound {
    /// Round without a common value.
    pub fn private(signals: Vec<f64>) -> Self {
        Self {
            signals,
            common_value: None,
        }
    }

    /// One single-element observation per player.
    pub fn observations(&self) -> Vec<Vec<f64>> {
        self.signals.iter().map(|&s| vec![s]).collect()
    }
}

/// Environment collaborator of the multi-agent learner.
pub trait AuctionEnv {
    /// Short human-readable name, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Number of bidders.
    fn n_players(&self) -> usize;

    /// Draws a new round.
    fn reset(&mut self) -> AuctionRound;

    /// Rewards for `bids` in `round`.
    ///
    /// `reward_exponent` shapes a positive winner surplus (see
    /// [`shaped_reward`]); environments that do not shape rewards ignore it.
    fn step(
        &mut self,
        round: &AuctionRound,
        bids: &[f64],
        reward_exponent: f64,
    ) -> Result<Vec<f64>, AuctionError>;
}

/// `surplus^r` for a positive surplus, the surplus unchanged otherwise.
pub fn shaped_reward(surplus: f64, reward_exponent: f64) -> f64 {
    if surplus > 0.0 {
        surplus.powf(reward_exponent)
    } else {
        surplus
    }
}

/// Index of the highest bid, ties broken uniformly at random.
///
/// Returns `None` for an empty slice.
pub fn argmax_with_random_tie(bids: &[f64], rng: &mut StdRng) -> Option<usize> {
    let max = bids.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let best: Vec<usize> = bids
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == max)
        .map(|(i, _)| i)
        .collect();
    best.choose(rng).copied()
}

/// Highest bid among every player except `winner`, or `0.0` if there is none.
pub fn highest_other_bid(bids: &[f64], winner: usize) -> f64 {
    bids.iter()
        .enumerate()
        .filter(|&(i, _)| i != winner)
        .map(|(_, &b)| b)
        .fold(0.0, f64::max)
}

pub(crate) fn check_bids(
    auction: &'static str,
    expected: usize,
    bids: &[f64],
) -> Result<(), AuctionError> {
    if bids.len() == expected {
        Ok(())
    } else {
        Err(AuctionError::BidCount {
            auction,
            expected,
            actual: bids.len(),
        })
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}
