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

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Full reserve-level state of one asset at one block.
///
/// Rate and index fields are ray-scaled (10^27). `unbacked` is carried
/// through from the reconstruction's initial state and
/// `accrued_to_treasury_scaled` is pinned at zero; neither is recomputed from
/// events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveState {
    pub block_number: u64,
    pub timestamp: u64,
    pub total_supply: U256,
    pub liquidity_rate: U256,
    pub liquidity_index: U256,
    pub total_stable_debt: U256,
    pub total_variable_debt: U256,
    pub variable_borrow_rate: U256,
    pub stable_borrow_rate: U256,
    pub variable_borrow_index: U256,
    pub last_update_timestamp: u64,
    pub average_stable_borrow_rate: U256,
    pub unbacked: U256,
    pub accrued_to_treasury_scaled: U256,
}

/// Which debt token a mint/burn touched. Stable-debt events also carry the
/// pool's new average stable borrow rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtToken {
    Variable,
    Stable { avg_rate: U256 },
}

/// One decoded pool mutation.
///
/// Mint and burn amounts include interest already accrued to the position
/// (`balance_increase`); the reconstructor nets that component out so it is
/// not double counted on top of the interest accrual it performs itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveEvent {
    Supply {
        amount: U256,
    },
    Withdraw {
        amount: U256,
    },
    ReserveDataUpdated {
        liquidity_rate: U256,
        liquidity_index: U256,
        variable_borrow_rate: U256,
        variable_borrow_index: U256,
        stable_borrow_rate: U256,
    },
    DebtMint {
        debt: DebtToken,
        value: U256,
        balance_increase: U256,
    },
    DebtBurn {
        debt: DebtToken,
        value: U256,
        balance_increase: U256,
    },
}

/// A reserve event together with its position on chain.
///
/// Events are totally ordered by `(block_number, log_index)`; the
/// reconstructor sorts same-block events by ascending log index before
/// applying them, so callers may hand them over in any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedReserveEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub event: ReserveEvent,
}
