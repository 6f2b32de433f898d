//! Local-local-global combinatorial auction with core-selecting payments.
//!
//! Two local bidders each want one of two items; a global bidder wants the
//! bundle. The locals win when their combined bid beats the global bid and
//! then pay the minimum amount that keeps the outcome in the core.

use rand::rngs::StdRng;
use rand::Rng;

use super::{check_bids, seeded_rng, AuctionEnv, AuctionRound};
use crate::error::AuctionError;

const N_PLAYERS: usize = 3;

/// Players are ordered `[local 1, local 2, global]`.
#[derive(Debug)]
pub struct CoreSelectingAuction {
    correlation: f64,
    rng: StdRng,
}

impl CoreSelectingAuction {
    /// Independent local values.
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_correlation(0.0, seed)
    }

    /// Local values `w·u + (1 − w)·u_i` share the common draw `u` with
    /// weight `w`, clamped to `[0, 1]`.
    pub fn with_correlation(correlation: f64, seed: Option<u64>) -> Self {
        Self {
            correlation: correlation.clamp(0.0, 1.0),
            rng: seeded_rng(seed),
        }
    }

    pub fn correlation(&self) -> f64 {
        self.correlation
    }

    /// Payments `[p1, p2, p_global]` for `bids`.
    pub fn payments(bids: [f64; N_PLAYERS]) -> [f64; N_PLAYERS] {
        let [b1, b2, global] = bids;
        let locals = b1 + b2;
        if locals > global {
            let p1 = if global > b2 { global - b2 } else { 0.0 };
            let p2 = if global > b1 { global - b1 } else { 0.0 };
            [p1, p2, 0.0]
        } else {
            [0.0, 0.0, locals]
        }
    }
}

impl AuctionEnv for CoreSelectingAuction {
    fn name(&self) -> &'static str {
        "core-selecting LLG"
    }

    fn n_players(&self) -> usize {
        N_PLAYERS
    }

    fn reset(&mut self) -> AuctionRound {
        let w = self.correlation;
        let u: f64 = self.rng.gen();
        let v1 = u * w + self.rng.gen::<f64>() * (1.0 - w);
        let v2 = u * w + self.rng.gen::<f64>() * (1.0 - w);
        let global: f64 = self.rng.gen();
        AuctionRound::private(vec![v1, v2, global])
    }

    /// Rewards are value minus payment for winners, zero for losers. Not shaped.
    fn step(
        &mut self,
        round: &AuctionRound,
        bids: &[f64],
        _reward_exponent: f64,
    ) -> Result<Vec<f64>, AuctionError> {
        check_bids(self.name(), N_PLAYERS, bids)?;
        let bids = [bids[0], bids[1], bids[2]];
        let values = &round.signals;
        let payments = Self::payments(bids);
        if bids[0] + bids[1] > bids[2] {
            Ok(vec![values[0] - payments[0], values[1] - payments[1], 0.0])
        } else {
            Ok(vec![0.0, 0.0, values[2] - payments[2]])
        }
    }
}
