//! Sealed-bid auctions with independent (or jointly drawn) private values.

use rand::rngs::StdRng;
use rand::Rng;

use super::{
    argmax_with_random_tie, check_bids, highest_other_bid, seeded_rng, shaped_reward, AuctionEnv,
    AuctionRound,
};
use crate::error::AuctionError;

/// All-pay participation cost charged on top of every losing bid.
const ALL_PAY_PARTICIPATION_COST: f64 = 0.1;

/// What the winner (and, for all-pay, everyone else) pays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payment {
    /// Winner pays its own bid.
    FirstPrice,
    /// Winner pays the highest competing bid.
    SecondPrice,
    /// Winner pays its own bid; every loser pays its bid plus `participation_cost`.
    AllPay { participation_cost: f64 },
}

/// How private values are drawn on reset.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueDistribution {
    /// Independent `U[0, 1]` per player.
    Uniform,
    /// Independent `U[0, scale_i]`; one scale per player.
    Scaled(Vec<f64>),
    /// Two correlated values `(x, y)` from the triangular joint density
    /// obtained by inverse-CDF sampling.
    Joint,
}

/// Private-value auction with a configurable payment rule and value draw.
#[derive(Debug)]
pub struct PrivateValueAuction {
    name: &'static str,
    n_players: usize,
    payment: Payment,
    values: ValueDistribution,
    rng: StdRng,
}

impl PrivateValueAuction {
    /// Creates an auction.
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in errors
    /// * `n_players` - Number of bidders
    /// * `payment` - Payment rule
    /// * `values` - Private value distribution
    /// * `seed` - RNG seed; `None` draws from entropy
    pub fn new(
        name: &'static str,
        n_players: usize,
        payment: Payment,
        values: ValueDistribution,
        seed: Option<u64>,
    ) -> Self {
        Self {
            name,
            n_players,
            payment,
            values,
            rng: seeded_rng(seed),
        }
    }

    pub fn first_price(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(
            "first-price",
            n_players,
            Payment::FirstPrice,
            ValueDistribution::Uniform,
            seed,
        )
    }

    pub fn second_price(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(
            "second-price",
            n_players,
            Payment::SecondPrice,
            ValueDistribution::Uniform,
            seed,
        )
    }

    pub fn all_pay(n_players: usize, seed: Option<u64>) -> Self {
        Self::new(
            "all-pay",
            n_players,
            Payment::AllPay {
                participation_cost: ALL_PAY_PARTICIPATION_COST,
            },
            ValueDistribution::Uniform,
            seed,
        )
    }

    /// Two-player first-price auction; the second bidder's value is on `[0, 2]`.
    pub fn asymmetric_first_price(seed: Option<u64>) -> Self {
        Self::new(
            "asymmetric first-price",
            2,
            Payment::FirstPrice,
            ValueDistribution::Scaled(vec![1.0, 2.0]),
            seed,
        )
    }

    /// Two-player first-price auction with correlated values.
    pub fn joint_first_price(seed: Option<u64>) -> Self {
        Self::new(
            "joint first-price",
            2,
            Payment::FirstPrice,
            ValueDistribution::Joint,
            seed,
        )
    }

    pub fn payment(&self) -> Payment {
        self.payment
    }

    fn draw_values(&mut self) -> Vec<f64> {
        match &self.values {
            ValueDistribution::Uniform => (0..self.n_players).map(|_| self.rng.gen()).collect(),
            ValueDistribution::Scaled(scales) => scales
                .iter()
                .map(|&scale| self.rng.gen::<f64>() * scale)
                .collect(),
            ValueDistribution::Joint => {
                let u: f64 = self.rng.gen();
                let v: f64 = self.rng.gen();
                let x = (-1.0 + (1.0 + 8.0 * u).sqrt()) / 2.0;
                let y = if x > 0.0 {
                    (-1.0 + (1.0 + 8.0 * x * v * (1.0 + 2.0 * x)).sqrt()) / (4.0 * x)
                } else {
                    v
                };
                vec![x, y]
            }
        }
    }
}

impl AuctionEnv for PrivateValueAuction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn n_players(&self) -> usize {
        self.n_players
    }

    fn reset(&mut self) -> AuctionRound {
        AuctionRound::private(self.draw_values())
    }

    fn step(
        &mut self,
        round: &AuctionRound,
        bids: &[f64],
        reward_exponent: f64,
    ) -> Result<Vec<f64>, AuctionError> {
        check_bids(self.name, self.n_players, bids)?;
        let mut rewards = match self.payment {
            Payment::AllPay { participation_cost } => {
                bids.iter().map(|b| -b - participation_cost).collect::<Vec<f64>>()
            }
            _ => vec![0.0; self.n_players],
        };
        let Some(winner) = argmax_with_random_tie(bids, &mut self.rng) else {
            return Ok(rewards);
        };
        let price = match self.payment {
            Payment::SecondPrice => highest_other_bid(bids, winner),
            Payment::FirstPrice | Payment::AllPay { .. } => bids[winner],
        };
        rewards[winner] = shaped_reward(round.signals[winner] - price, reward_exponent);
        Ok(rewards)
    }
}

/// Procurement auction: the highest discount bid wins the contract and earns
/// `max_revenue * (1 - bid) - cost`.
#[derive(Debug)]
pub struct TariffDiscountAuction {
    n_players: usize,
    max_revenue: f64,
    rng: StdRng,
}

impl TariffDiscountAuction {
    pub fn new(n_players: usize, max_revenue: f64, seed: Option<u64>) -> Self {
        Self {
            n_players,
            max_revenue,
            rng: seeded_rng(seed),
        }
    }

    pub fn max_revenue(&self) -> f64 {
        self.max_revenue
    }
}

impl AuctionEnv for TariffDiscountAuction {
    fn name(&self) -> &'static str {
        "tariff-discount"
    }

    fn n_players(&self) -> usize {
        self.n_players
    }

    /// Costs drawn on `[0, max_revenue]`.
    fn reset(&mut self) -> AuctionRound {
        let costs = (0..self.n_players)
            .map(|_| self.rng.gen::<f64>() * self.max_revenue)
            .collect();
        AuctionRound::private(costs)
    }

    fn step(
        &mut self,
        round: &AuctionRound,
        bids: &[f64],
        reward_exponent: f64,
    ) -> Result<Vec<f64>, AuctionError> {
        check_bids(self.name(), self.n_players, bids)?;
        let mut rewards = vec![0.0; self.n_players];
        if let Some(winner) = argmax_with_random_tie(bids, &mut self.rng) {
            let surplus = self.max_revenue * (1.0 - bids[winner]) - round.signals[winner];
            rewards[winner] = shaped_reward(surplus, reward_exponent);
        }
        Ok(rewards)
    }
}
