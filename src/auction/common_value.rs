//! Common-value auctions: the item is worth the same to every bidder, and
//! each bidder only observes a noisy signal of that value.
//!
//! None of these games shape rewards, so the reward exponent passed to
//! [`AuctionEnv::step`] is ignored.

use rand::rngs::StdRng;
use rand::Rng;

use super::{
    argmax_with_random_tie, check_bids, highest_other_bid, seeded_rng, AuctionEnv, AuctionRound,
};
use crate::error::AuctionError;

/// How the common value and the signals are drawn, and what the winner pays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommonValueRule {
    /// Value `V ~ U[low, high]`; signals uniform on `[V - eps, V + eps]`
    /// clipped to `[low, high]`. First price.
    Bounded { low: f64, high: f64, eps: f64 },
    /// Signals `U[0, 1]`, value = sum of signals. First price; a zero bid
    /// never wins.
    SignalSum,
    /// Signals `U[0, 1]`, value = sum of signals. Second price.
    SignalSumSecondPrice,
}

#[derive(Debug)]
pub struct CommonValueAuction {
    n_players: usize,
    rule: CommonValueRule,
    rng: StdRng,
}

impl CommonValueAuction {
    pub fn new(n_players: usize, rule: CommonValueRule, seed: Option<u64>) -> Self {
        Self {
            n_players,
            rule,
            rng: seeded_rng(seed),
        }
    }

    /// Value on `[0, 1]`, signals within `0.1` of it.
    pub fn bounded(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(
            n_players,
            CommonValueRule::Bounded {
                low: 0.0,
                high: 1.0,
                eps: 0.1,
            },
            seed,
        )
    }

    pub fn signal_sum(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(n_players, CommonValueRule::SignalSum, seed)
    }

    pub fn signal_sum_second_price(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(n_players, CommonValueRule::SignalSumSecondPrice, seed)
    }

    pub fn rule(&self) -> CommonValueRule {
        self.rule
    }
}

impl AuctionEnv for CommonValueAuction {
    fn name(&self) -> &'static str {
        match self.rule {
            CommonValueRule::Bounded { .. } => "common-value",
            CommonValueRule::SignalSum => "alternative common-value",
            CommonValueRule::SignalSumSecondPrice => "second-price common-value",
        }
    }

    fn n_players(&self) -> usize {
        self.n_players
    }

    fn reset(&mut self) -> AuctionRound {
        match self.rule {
            CommonValueRule::Bounded { low, high, eps } => {
                let value = self.rng.gen_range(low..=high);
                let least = (value - eps).max(low);
                let top = (value + eps).min(high);
                let signals = (0..self.n_players)
                    .map(|_| self.rng.gen_range(least..=top))
                    .collect();
                AuctionRound {
                    signals,
                    common_value: Some(value),
                }
            }
            CommonValueRule::SignalSum | CommonValueRule::SignalSumSecondPrice => {
                let signals: Vec<f64> = (0..self.n_players).map(|_| self.rng.gen()).collect();
                let value: f64 = signals.iter().sum();
                AuctionRound {
                    signals,
                    common_value: Some(value),
                }
            }
        }
    }

    fn step(
        &mut self,
        round: &AuctionRound,
        bids: &[f64],
        _reward_exponent: f64,
    ) -> Result<Vec<f64>, AuctionError> {
        let auction = self.name();
        check_bids(auction, self.n_players, bids)?;
        let value = round
            .common_value
            .ok_or(AuctionError::MissingCommonValue { auction })?;

        let mut rewards = vec![0.0; self.n_players];
        let Some(winner) = argmax_with_random_tie(bids, &mut self.rng) else {
            return Ok(rewards);
        };
        match self.rule {
            CommonValueRule::Bounded { .. } => rewards[winner] = value - bids[winner],
            CommonValueRule::SignalSum => {
                if bids[winner] > 0.0 {
                    rewards[winner] = value - bids[winner];
                }
            }
            CommonValueRule::SignalSumSecondPrice => {
                rewards[winner] = value - highest_other_bid(bids, winner);
            }
        }
        Ok(rewards)
    }
}
