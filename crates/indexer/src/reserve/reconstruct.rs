// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-block reconstruction walk.
//!
//! A single on-chain read gives the reserve state at the start of the range;
//! every later block is derived by accruing interest on scaled principals and
//! applying that block's mutation events. This trades one RPC call per block
//! for one call per range, at the cost of reproducing the pool's accrual
//! math exactly.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};
use anyhow::anyhow;
use ray_math::{compound_interest, linear_interest, ray_div, ray_mul};

use crate::{
    providers::ChainReader,
    reserve::types::{DebtToken, OrderedReserveEvent, ReserveEvent, ReserveState},
    ServiceError,
};

/// Principal balances with accrued interest backed out.
///
/// Exists only while walking a block range; rescaled whenever an event
/// changes a principal so later blocks accrue from the updated base. Deriving
/// the raw balance back with the same interest factor reproduces the raw
/// balance the scaling started from, up to fixed-point rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledBalances {
    pub scaled_supply: U256,
    pub scaled_variable_debt: U256,
    pub scaled_stable_debt: U256,
}

/// Back a raw balance out to its scaled principal: `value / (interest * index)`.
pub fn scaled_from_current(value: U256, interest: U256, index: U256) -> U256 {
    ray_div(value, ray_mul(interest, index))
}

/// Grow a scaled principal to its raw balance: `scaled * (interest * index)`.
pub fn current_from_scaled(scaled: U256, interest: U256, index: U256) -> U256 {
    ray_mul(scaled, ray_mul(interest, index))
}

/// Invert the accrual formulas at `timestamp` to recover the scaled
/// principals behind `initial`'s raw balances. Supply accrues linearly
/// against the liquidity index, variable debt compounds against the variable
/// borrow index, stable debt compounds on the average stable rate with no
/// index.
pub fn initial_scaled_balances(initial: &ReserveState, timestamp: u64) -> ScaledBalances {
    let supply_interest =
        linear_interest(initial.liquidity_rate, initial.last_update_timestamp, timestamp);
    let variable_interest =
        compound_interest(initial.variable_borrow_rate, initial.last_update_timestamp, timestamp);
    let stable_interest = compound_interest(
        initial.average_stable_borrow_rate,
        initial.last_update_timestamp,
        timestamp,
    );

    ScaledBalances {
        scaled_supply: scaled_from_current(
            initial.total_supply,
            supply_interest,
            initial.liquidity_index,
        ),
        scaled_variable_debt: scaled_from_current(
            initial.total_variable_debt,
            variable_interest,
            initial.variable_borrow_index,
        ),
        scaled_stable_debt: ray_div(initial.total_stable_debt, stable_interest),
    }
}

// Net balance delta collected from one block's events, applied after accrual.
#[derive(Debug, Default, Clone, Copy)]
struct Adjustment {
    added: U256,
    removed: U256,
    touched: bool,
}

impl Adjustment {
    fn add(&mut self, amount: U256) {
        self.added += amount;
        self.touched = true;
    }

    fn remove(&mut self, amount: U256) {
        self.removed += amount;
        self.touched = true;
    }

    fn apply(&self, value: U256, what: &str, block: u64) -> Result<U256, ServiceError> {
        let raised = value
            .checked_add(self.added)
            .ok_or_else(|| ServiceError::Error(anyhow!("{what} overflow at block {block}")))?;
        raised.checked_sub(self.removed).ok_or_else(|| {
            ServiceError::Error(anyhow!("{what} underflow applying events at block {block}"))
        })
    }
}

/// Reconstruct one reserve state per block of `[from_block, to_block]` from
/// the state at `from_block` and the mutation events emitted after it.
///
/// Within a block, rate updates are applied before accrual (a
/// `ReserveDataUpdated` resets the accrual clock to the block's own
/// timestamp), balance deltas are applied after accrual, and any principal an
/// event touched is rescaled so subsequent blocks accrue from the new base.
/// Same-block events are applied in ascending log-index order. A block
/// missing from `timestamps` is a fatal input-contract violation.
pub fn reconstruct(
    initial: &ReserveState,
    events: &[OrderedReserveEvent],
    timestamps: &BTreeMap<u64, u64>,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<ReserveState>, ServiceError> {
    if to_block < from_block {
        return Err(ServiceError::Error(anyhow!(
            "invalid block range: {from_block} > {to_block}"
        )));
    }

    let mut by_block: BTreeMap<u64, Vec<&OrderedReserveEvent>> = BTreeMap::new();
    for event in events {
        if event.block_number > from_block && event.block_number <= to_block {
            by_block.entry(event.block_number).or_default().push(event);
        } else {
            tracing::debug!(
                "Ignoring event outside block range {}-{} at block {}",
                from_block,
                to_block,
                event.block_number
            );
        }
    }
    for same_block in by_block.values_mut() {
        same_block.sort_by_key(|event| event.log_index);
    }

    let start_timestamp = *timestamps
        .get(&from_block)
        .ok_or_else(|| ServiceError::DataGap(format!("no timestamp for block {from_block}")))?;

    let mut scaled = initial_scaled_balances(initial, start_timestamp);

    let mut liquidity_rate = initial.liquidity_rate;
    let mut liquidity_index = initial.liquidity_index;
    let mut variable_rate = initial.variable_borrow_rate;
    let mut variable_index = initial.variable_borrow_index;
    let mut stable_rate = initial.stable_borrow_rate;
    let mut average_stable_rate = initial.average_stable_borrow_rate;
    let mut last_update = initial.last_update_timestamp;

    let mut states = Vec::with_capacity((to_block - from_block + 1) as usize);
    states.push(ReserveState {
        block_number: from_block,
        timestamp: start_timestamp,
        total_supply: initial.total_supply,
        liquidity_rate,
        liquidity_index,
        total_stable_debt: initial.total_stable_debt,
        total_variable_debt: initial.total_variable_debt,
        variable_borrow_rate: variable_rate,
        stable_borrow_rate: stable_rate,
        variable_borrow_index: variable_index,
        last_update_timestamp: last_update,
        average_stable_borrow_rate: average_stable_rate,
        unbacked: initial.unbacked,
        accrued_to_treasury_scaled: U256::ZERO,
    });

    for block in from_block + 1..=to_block {
        let timestamp = *timestamps
            .get(&block)
            .ok_or_else(|| ServiceError::DataGap(format!("no timestamp for block {block}")))?;

        let mut supply_adj = Adjustment::default();
        let mut variable_adj = Adjustment::default();
        let mut stable_adj = Adjustment::default();

        for ordered in by_block.get(&block).map(Vec::as_slice).unwrap_or_default() {
            match &ordered.event {
                ReserveEvent::Supply { amount } => supply_adj.add(*amount),
                ReserveEvent::Withdraw { amount } => supply_adj.remove(*amount),
                ReserveEvent::ReserveDataUpdated {
                    liquidity_rate: new_liquidity_rate,
                    liquidity_index: new_liquidity_index,
                    variable_borrow_rate: new_variable_rate,
                    variable_borrow_index: new_variable_index,
                    stable_borrow_rate: new_stable_rate,
                } => {
                    liquidity_rate = *new_liquidity_rate;
                    liquidity_index = *new_liquidity_index;
                    variable_rate = *new_variable_rate;
                    variable_index = *new_variable_index;
                    stable_rate = *new_stable_rate;
                    last_update = timestamp;
                }
                ReserveEvent::DebtMint { debt, value, balance_increase } => match debt {
                    DebtToken::Variable => {
                        variable_adj.add(*value);
                        variable_adj.remove(*balance_increase);
                    }
                    DebtToken::Stable { avg_rate } => {
                        stable_adj.add(*value);
                        stable_adj.remove(*balance_increase);
                        average_stable_rate = *avg_rate;
                    }
                },
                ReserveEvent::DebtBurn { debt, value, balance_increase } => match debt {
                    DebtToken::Variable => {
                        variable_adj.remove(*value);
                        variable_adj.remove(*balance_increase);
                    }
                    DebtToken::Stable { avg_rate } => {
                        stable_adj.remove(*value);
                        stable_adj.remove(*balance_increase);
                        average_stable_rate = *avg_rate;
                    }
                },
            }
        }

        let supply_interest = linear_interest(liquidity_rate, last_update, timestamp);
        let variable_interest = compound_interest(variable_rate, last_update, timestamp);
        let stable_interest = compound_interest(average_stable_rate, last_update, timestamp);

        let mut supply = current_from_scaled(scaled.scaled_supply, supply_interest, liquidity_index);
        let mut variable_debt =
            current_from_scaled(scaled.scaled_variable_debt, variable_interest, variable_index);
        let mut stable_debt = ray_mul(stable_interest, scaled.scaled_stable_debt);

        supply = supply_adj.apply(supply, "total supply", block)?;
        variable_debt = variable_adj.apply(variable_debt, "variable debt", block)?;
        stable_debt = stable_adj.apply(stable_debt, "stable debt", block)?;

        // Rescale after the adjusted raw balances are known, not before.
        if supply_adj.touched {
            scaled.scaled_supply = scaled_from_current(supply, supply_interest, liquidity_index);
        }
        if variable_adj.touched {
            scaled.scaled_variable_debt =
                scaled_from_current(variable_debt, variable_interest, variable_index);
        }
        if stable_adj.touched {
            scaled.scaled_stable_debt = ray_div(stable_debt, stable_interest);
        }

        states.push(ReserveState {
            block_number: block,
            timestamp,
            total_supply: supply,
            liquidity_rate,
            liquidity_index,
            total_stable_debt: stable_debt,
            total_variable_debt: variable_debt,
            variable_borrow_rate: variable_rate,
            stable_borrow_rate: stable_rate,
            variable_borrow_index: variable_index,
            last_update_timestamp: last_update,
            average_stable_borrow_rate: average_stable_rate,
            unbacked: initial.unbacked,
            accrued_to_treasury_scaled: U256::ZERO,
        });
    }

    Ok(states)
}

/// Fetch everything a reconstruction needs and run the walk.
///
/// The initial-state read, the event query and the timestamp query are
/// independent and issued concurrently; the walk itself is sequential since
/// each block's state depends on the previous one.
pub async fn reconstruct_range(
    chain: &dyn ChainReader,
    asset: Address,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<ReserveState>, ServiceError> {
    tracing::debug!(
        "Reconstructing reserve state for {} over blocks {}-{}",
        asset,
        from_block,
        to_block
    );

    let (initial, events, timestamps) = tokio::try_join!(
        chain.reserve_state_at(asset, from_block),
        chain.mutation_events(asset, from_block + 1, to_block),
        chain.block_timestamps(from_block, to_block),
    )?;

    let states = reconstruct(&initial, &events, &timestamps, from_block, to_block)?;
    tracing::debug!(
        "Reconstructed {} states for {} from {} events",
        states.len(),
        asset,
        events.len()
    );
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ray_math::RAY;

    fn eth(n: u64) -> U256 {
        U256::from(n) * U256::from(10).pow(U256::from(18))
    }

    #[test]
    fn scaled_round_trip_is_lossless_at_identity_factors() {
        let value = eth(1_000);
        let scaled = scaled_from_current(value, RAY, RAY);
        assert_eq!(scaled, value);
        assert_eq!(current_from_scaled(scaled, RAY, RAY), value);
    }

    #[test]
    fn scaled_round_trip_recovers_value_under_accrual() {
        let value = eth(1_000);
        let interest = linear_interest(RAY / U256::from(20), 0, ray_math::SECONDS_PER_YEAR);
        let index = RAY * U256::from(2);
        let scaled = scaled_from_current(value, interest, index);
        assert_eq!(current_from_scaled(scaled, interest, index), value);
    }

    #[test]
    fn initial_backout_at_zero_elapsed_returns_raw_balances() {
        let initial = ReserveState {
            block_number: 1,
            timestamp: 500,
            total_supply: eth(1_000),
            liquidity_rate: RAY / U256::from(20),
            liquidity_index: RAY,
            total_stable_debt: eth(200),
            total_variable_debt: eth(500),
            variable_borrow_rate: RAY / U256::from(10),
            stable_borrow_rate: RAY / U256::from(8),
            variable_borrow_index: RAY * U256::from(2),
            last_update_timestamp: 500,
            average_stable_borrow_rate: RAY / U256::from(25),
            unbacked: U256::ZERO,
            accrued_to_treasury_scaled: U256::ZERO,
        };
        let scaled = initial_scaled_balances(&initial, 500);
        assert_eq!(scaled.scaled_supply, eth(1_000));
        assert_eq!(scaled.scaled_variable_debt, eth(250));
        assert_eq!(scaled.scaled_stable_debt, eth(200));
    }
}
