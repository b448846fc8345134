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

//! In-memory collaborators for exercising the engines without chain or
//! storage access.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
    time::{Duration, Instant},
};

use alloy::primitives::{Address, U256};
use anyhow::anyhow;
use async_trait::async_trait;
use ray_math::RAY;

use crate::{
    aggregation::{AprAggregate, AssetDetail, PoolSnapshot},
    providers::{
        AggregateRef, ChainReader, EpochOracle, FetchError, RebuildGuard, SnapshotStore,
        TailEpoch, WindowSizing,
    },
    reserve::{OrderedReserveEvent, ReserveState},
};

/// A reserve state with sane defaults: zero balances and rates, identity
/// indices, accrual clock at `timestamp`. Tests overwrite what they need.
pub fn reserve_state(block_number: u64, timestamp: u64) -> ReserveState {
    ReserveState {
        block_number,
        timestamp,
        total_supply: U256::ZERO,
        liquidity_rate: U256::ZERO,
        liquidity_index: RAY,
        total_stable_debt: U256::ZERO,
        total_variable_debt: U256::ZERO,
        variable_borrow_rate: U256::ZERO,
        stable_borrow_rate: U256::ZERO,
        variable_borrow_index: RAY,
        last_update_timestamp: timestamp,
        average_stable_borrow_rate: U256::ZERO,
        unbacked: U256::ZERO,
        accrued_to_treasury_scaled: U256::ZERO,
    }
}

/// Single-asset snapshot with all three ray rates set to
/// `rate_hundredths / 100` and the same fraction as optimal utilization.
pub fn pool_snapshot(rate_hundredths: u64, timestamp: u64) -> PoolSnapshot {
    let asset = Address::repeat_byte(0x11);
    let rate = RAY * U256::from(rate_hundredths) / U256::from(100);
    PoolSnapshot {
        timestamp,
        liquidity_rate: BTreeMap::from([(asset, rate)]),
        variable_borrow_rate: BTreeMap::from([(asset, rate)]),
        stable_borrow_rate: BTreeMap::from([(asset, rate)]),
        asset_details: BTreeMap::from([(
            asset,
            AssetDetail { optimal_rate: rate_hundredths as f64 / 100.0 },
        )]),
    }
}

/// Chain reader over a fixed initial state, event list and timestamp map.
pub struct StaticChainReader {
    pub initial: ReserveState,
    pub events: Vec<OrderedReserveEvent>,
    pub timestamps: BTreeMap<u64, u64>,
}

#[async_trait]
impl ChainReader for StaticChainReader {
    async fn reserve_state_at(
        &self,
        _asset: Address,
        block: u64,
    ) -> Result<ReserveState, FetchError> {
        if block == self.initial.block_number {
            Ok(self.initial.clone())
        } else {
            Err(FetchError::Chain(anyhow!("no reserve data staged for block {block}")))
        }
    }

    async fn mutation_events(
        &self,
        _asset: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<OrderedReserveEvent>, FetchError> {
        Ok(self
            .events
            .iter()
            .filter(|event| event.block_number >= from_block && event.block_number <= to_block)
            .cloned()
            .collect())
    }

    async fn block_timestamps(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<BTreeMap<u64, u64>, FetchError> {
        Ok(self
            .timestamps
            .range(from_block..=to_block)
            .map(|(block, ts)| (*block, *ts))
            .collect())
    }
}

#[derive(Default)]
struct StoreState {
    first_epoch: u64,
    finalized: BTreeMap<u64, PoolSnapshot>,
    submitted: BTreeMap<u64, PoolSnapshot>,
    aggregates: HashMap<String, AprAggregate>,
    last_aggregate: Option<AggregateRef>,
    fail_submitted: bool,
    range_delay: Option<Duration>,
}

/// Snapshot store backed by in-memory maps, with failure and latency
/// injection knobs.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<StoreState>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_first_epoch(&self, epoch: u64) {
        self.inner.lock().unwrap().first_epoch = epoch;
    }

    pub fn insert_finalized(&self, epoch: u64, snapshot: PoolSnapshot) {
        self.inner.lock().unwrap().finalized.insert(epoch, snapshot);
    }

    pub fn insert_submitted(&self, epoch: u64, snapshot: PoolSnapshot) {
        self.inner.lock().unwrap().submitted.insert(epoch, snapshot);
    }

    pub fn insert_aggregate(&self, cid: &str, aggregate: AprAggregate) {
        self.inner.lock().unwrap().aggregates.insert(cid.to_string(), aggregate);
    }

    pub fn set_last_aggregate(&self, cid: &str, epoch_id: u64) {
        self.inner.lock().unwrap().last_aggregate =
            Some(AggregateRef { cid: cid.to_string(), epoch_id });
    }

    /// Make every submitted-snapshot read fail with a storage error.
    pub fn fail_submitted_fetches(&self) {
        self.inner.lock().unwrap().fail_submitted = true;
    }

    /// Delay range reads, so concurrent evaluations actually overlap.
    pub fn delay_ranges(&self, delay: Duration) {
        self.inner.lock().unwrap().range_delay = Some(delay);
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn first_epoch(&self, _target_id: &str) -> Result<u64, FetchError> {
        Ok(self.inner.lock().unwrap().first_epoch)
    }

    async fn last_finalized_epoch(&self, _target_id: &str) -> Result<Option<u64>, FetchError> {
        Ok(self.inner.lock().unwrap().finalized.keys().next_back().copied())
    }

    async fn snapshot_range(
        &self,
        _target_id: &str,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<Vec<Option<PoolSnapshot>>, FetchError> {
        let (delay, range) = {
            let state = self.inner.lock().unwrap();
            let range =
                (from_epoch..=to_epoch).map(|epoch| state.finalized.get(&epoch).cloned()).collect();
            (state.range_delay, range)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(range)
    }

    async fn submitted_snapshot(
        &self,
        _target_id: &str,
        epoch_id: u64,
    ) -> Result<Option<PoolSnapshot>, FetchError> {
        let state = self.inner.lock().unwrap();
        if state.fail_submitted {
            return Err(FetchError::Storage(anyhow!("injected submitted-snapshot failure")));
        }
        Ok(state.submitted.get(&epoch_id).cloned())
    }

    async fn last_finalized_aggregate(
        &self,
        _target_id: &str,
    ) -> Result<Option<AggregateRef>, FetchError> {
        Ok(self.inner.lock().unwrap().last_aggregate.clone())
    }

    async fn resolve_aggregate(&self, cid: &str) -> Result<Option<AprAggregate>, FetchError> {
        Ok(self.inner.lock().unwrap().aggregates.get(cid).cloned())
    }
}

/// Epoch oracle with fixed chain geometry. The tail is derived the way the
/// protocol state contract does it: current epoch minus the window's span in
/// epochs, clamped to the target's first epoch and flagged extrapolated when
/// the clamp engaged.
pub struct FixedEpochOracle {
    pub first_epoch: u64,
    pub sizing: WindowSizing,
}

#[async_trait]
impl EpochOracle for FixedEpochOracle {
    async fn tail_epoch(
        &self,
        current_epoch: u64,
        window_secs: u64,
        _target_id: &str,
    ) -> Result<TailEpoch, FetchError> {
        let span = window_secs / (self.sizing.epoch_size_blocks * self.sizing.block_time_secs);
        let raw_tail = current_epoch.saturating_sub(span);
        if raw_tail < self.first_epoch {
            Ok(TailEpoch { epoch_id: self.first_epoch, extrapolated: true })
        } else {
            Ok(TailEpoch { epoch_id: raw_tail, extrapolated: false })
        }
    }

    async fn window_sizing(&self, _target_id: &str) -> Result<WindowSizing, FetchError> {
        Ok(self.sizing)
    }
}

/// Advisory rebuild marker held in a map of expiry instants.
#[derive(Default)]
pub struct InMemoryRebuildGuard {
    held: Mutex<HashMap<String, Instant>>,
}

impl InMemoryRebuildGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, target_id: &str) -> bool {
        self.held.lock().unwrap().get(target_id).is_some_and(|expiry| *expiry > Instant::now())
    }
}

#[async_trait]
impl RebuildGuard for InMemoryRebuildGuard {
    async fn try_acquire(&self, target_id: &str, ttl: Duration) -> Result<bool, FetchError> {
        let mut held = self.held.lock().unwrap();
        let now = Instant::now();
        if held.get(target_id).is_some_and(|expiry| *expiry > now) {
            return Ok(false);
        }
        held.insert(target_id.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, target_id: &str) -> Result<(), FetchError> {
        self.held.lock().unwrap().remove(target_id);
        Ok(())
    }
}
