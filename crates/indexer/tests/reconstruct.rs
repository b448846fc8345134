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

use std::collections::BTreeMap;

use alloy::primitives::{uint, Address, U256};
use ray_math::{RAY, SECONDS_PER_YEAR};
use reserve_indexer::{
    reserve::{
        reconstruct, reconstruct_range, DebtToken, OrderedReserveEvent, ReserveEvent, ReserveState,
    },
    test_utils::{reserve_state, StaticChainReader},
    ServiceError,
};

fn eth(n: u64) -> U256 {
    U256::from(n) * U256::from(10).pow(U256::from(18))
}

fn pct(n: u64) -> U256 {
    RAY * U256::from(n) / U256::from(100)
}

fn ev(block_number: u64, log_index: u64, event: ReserveEvent) -> OrderedReserveEvent {
    OrderedReserveEvent { block_number, log_index, event }
}

fn funded_reserve(block: u64, timestamp: u64) -> ReserveState {
    ReserveState {
        total_supply: eth(1_000),
        liquidity_rate: pct(5),
        total_variable_debt: eth(500),
        variable_borrow_rate: pct(10),
        total_stable_debt: eth(200),
        average_stable_borrow_rate: pct(4),
        stable_borrow_rate: pct(6),
        ..reserve_state(block, timestamp)
    }
}

#[test]
fn interest_only_blocks_accrue() {
    let mut initial = funded_reserve(100, 1_000);
    initial.variable_borrow_index = RAY * U256::from(2);
    let timestamps = BTreeMap::from([(100, 1_000), (101, 1_000 + SECONDS_PER_YEAR)]);

    let states = reconstruct(&initial, &[], &timestamps, 100, 101).unwrap();
    assert_eq!(states.len(), 2);

    // supply grows linearly, both debts compound
    assert_eq!(states[1].total_supply, eth(1_050));
    assert_eq!(states[1].total_variable_debt, uint!(552_581_021_410_891_206_288_U256));
    assert_eq!(states[1].total_stable_debt, uint!(208_162_090_872_070_995_208_U256));
    assert_eq!(states[1].timestamp, 1_000 + SECONDS_PER_YEAR);
    assert_eq!(states[1].last_update_timestamp, 1_000);
    assert_eq!(states[1].liquidity_rate, pct(5));
}

#[test]
fn zero_elapsed_walk_is_identity() {
    let initial = funded_reserve(100, 1_000);
    let timestamps = BTreeMap::from([(100, 1_000), (101, 1_000)]);

    let states = reconstruct(&initial, &[], &timestamps, 100, 101).unwrap();
    let expected = ReserveState { block_number: 101, ..states[0].clone() };
    assert_eq!(states[1], expected);
}

#[test]
fn supply_events_adjust_then_accrue_from_new_principal() {
    let initial = funded_reserve(100, 1_000);
    let timestamps =
        BTreeMap::from([(100, 1_000), (101, 1_000), (102, 1_000 + SECONDS_PER_YEAR)]);
    let events = vec![
        ev(101, 1, ReserveEvent::Supply { amount: eth(100) }),
        ev(101, 2, ReserveEvent::Withdraw { amount: eth(30) }),
    ];

    let states = reconstruct(&initial, &events, &timestamps, 100, 102).unwrap();
    assert_eq!(states[1].total_supply, eth(1_070));
    // one year of 5% linear interest on the adjusted principal
    assert_eq!(states[2].total_supply, uint!(1_123_500_000_000_000_000_000_U256));
}

#[test]
fn debt_events_are_net_of_balance_increase() {
    let initial = funded_reserve(100, 1_000);
    let timestamps = BTreeMap::from([(100, 1_000), (101, 1_000), (102, 1_000)]);
    let events = vec![
        ev(
            101,
            1,
            ReserveEvent::DebtMint {
                debt: DebtToken::Variable,
                value: eth(50),
                balance_increase: eth(10),
            },
        ),
        ev(
            101,
            2,
            ReserveEvent::DebtMint {
                debt: DebtToken::Stable { avg_rate: pct(6) },
                value: eth(20),
                balance_increase: eth(5),
            },
        ),
        ev(
            102,
            1,
            ReserveEvent::DebtBurn {
                debt: DebtToken::Variable,
                value: eth(20),
                balance_increase: eth(5),
            },
        ),
    ];

    let states = reconstruct(&initial, &events, &timestamps, 100, 102).unwrap();
    assert_eq!(states[1].total_variable_debt, eth(540));
    assert_eq!(states[1].total_stable_debt, eth(215));
    assert_eq!(states[1].average_stable_borrow_rate, pct(6));
    assert_eq!(states[2].total_variable_debt, eth(515));
    assert_eq!(states[2].total_stable_debt, eth(215));
}

#[test]
fn same_block_events_apply_in_log_index_order() {
    let initial = funded_reserve(100, 1_000);
    let timestamps = BTreeMap::from([(100, 1_000), (101, 1_000)]);
    let update = |liquidity_rate| ReserveEvent::ReserveDataUpdated {
        liquidity_rate,
        liquidity_index: RAY,
        variable_borrow_rate: pct(10),
        variable_borrow_index: RAY,
        stable_borrow_rate: pct(6),
    };
    // handed over out of order: the log-index-2 update must win
    let events = vec![ev(101, 2, update(pct(9))), ev(101, 1, update(pct(3)))];

    let states = reconstruct(&initial, &events, &timestamps, 100, 101).unwrap();
    assert_eq!(states[1].liquidity_rate, pct(9));
    assert_eq!(states[1].last_update_timestamp, 1_000);
}

#[test]
fn rate_update_resets_accrual_clock() {
    let initial = funded_reserve(100, 1_000);
    let timestamps = BTreeMap::from([(100, 1_000), (101, 1_000 + SECONDS_PER_YEAR)]);
    // rates replaced in the same block the accrual would have landed on:
    // the accrual clock restarts at the block timestamp, so no interest
    // applies this block
    let events = vec![ev(
        101,
        1,
        ReserveEvent::ReserveDataUpdated {
            liquidity_rate: pct(1),
            liquidity_index: RAY,
            variable_borrow_rate: pct(2),
            variable_borrow_index: RAY,
            stable_borrow_rate: pct(3),
        },
    )];

    let states = reconstruct(&initial, &events, &timestamps, 100, 101).unwrap();
    assert_eq!(states[1].total_supply, initial.total_supply);
    assert_eq!(states[1].last_update_timestamp, 1_000 + SECONDS_PER_YEAR);
    assert_eq!(states[1].liquidity_rate, pct(1));
}

#[test]
fn missing_block_timestamp_is_fatal() {
    let initial = funded_reserve(100, 1_000);
    let timestamps = BTreeMap::from([(100, 1_000), (102, 1_200)]);

    let err = reconstruct(&initial, &[], &timestamps, 100, 102).unwrap_err();
    assert!(matches!(err, ServiceError::DataGap(_)), "got {err:?}");
}

#[tokio::test]
async fn reconstruct_range_joins_fetches_and_walks() {
    let chain = StaticChainReader {
        initial: funded_reserve(100, 1_000),
        events: vec![ev(101, 1, ReserveEvent::Supply { amount: eth(100) })],
        timestamps: BTreeMap::from([(100, 1_000), (101, 1_000)]),
    };

    let states = reconstruct_range(&chain, Address::repeat_byte(0xaa), 100, 101).await.unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[1].total_supply, eth(1_100));
}

#[tokio::test]
async fn reconstruct_range_surfaces_chain_failures_as_transient() {
    let chain = StaticChainReader {
        initial: funded_reserve(100, 1_000),
        events: Vec::new(),
        timestamps: BTreeMap::new(),
    };

    let err = reconstruct_range(&chain, Address::repeat_byte(0xaa), 99, 101).await.unwrap_err();
    assert!(matches!(err, ServiceError::TransientFetch(_)), "got {err:?}");
}
