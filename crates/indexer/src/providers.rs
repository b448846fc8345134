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

//! Collaborator seams for chain, snapshot-storage and epoch access.
//!
//! The engines only ever see these traits; concrete implementations (RPC
//! clients, content-addressed storage, a redis-style key-value store) are
//! injected by the host process. Every failure surfaces as a [`FetchError`]
//! and is treated as transient by the callers.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

use crate::{
    aggregation::{AprAggregate, PoolSnapshot},
    reserve::{OrderedReserveEvent, ReserveState},
};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("chain read failed: {0}")]
    Chain(#[source] anyhow::Error),

    #[error("storage read failed: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Pointer to the most recently finalized aggregate of a target, addressable
/// by content identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRef {
    pub cid: String,
    pub epoch_id: u64,
}

/// Oldest epoch still inside the trailing window at some evaluation point.
/// `extrapolated` is set when the target's history is shorter than the window
/// and the tail had to be clamped to the first known epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailEpoch {
    pub epoch_id: u64,
    pub extrapolated: bool,
}

/// Chain geometry used to size the window in epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSizing {
    pub epoch_size_blocks: u64,
    pub block_time_secs: u64,
}

/// Read access to on-chain reserve data.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Full reserve state of `asset` as reported by the pool at `block`.
    async fn reserve_state_at(&self, asset: Address, block: u64)
        -> Result<ReserveState, FetchError>;

    /// Decoded pool mutation events touching `asset` over
    /// `[from_block, to_block]`. Empty when the range is empty or inverted.
    async fn mutation_events(
        &self,
        asset: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<OrderedReserveEvent>, FetchError>;

    /// Block timestamps over `[from_block, to_block]`. Blocks the provider
    /// cannot resolve are simply absent from the map.
    async fn block_timestamps(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<BTreeMap<u64, u64>, FetchError>;
}

pub type ChainReaderObj = Arc<dyn ChainReader>;

/// Read access to persisted per-epoch snapshots and finalized aggregates.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// First epoch for which the target ever produced a snapshot; `0` means
    /// no history exists yet.
    async fn first_epoch(&self, target_id: &str) -> Result<u64, FetchError>;

    /// Newest epoch with a finalized per-epoch snapshot, if any.
    async fn last_finalized_epoch(&self, target_id: &str) -> Result<Option<u64>, FetchError>;

    /// Finalized per-epoch snapshots over `[from_epoch, to_epoch]`, one slot
    /// per epoch, `None` where no snapshot was finalized.
    async fn snapshot_range(
        &self,
        target_id: &str,
        from_epoch: u64,
        to_epoch: u64,
    ) -> Result<Vec<Option<PoolSnapshot>>, FetchError>;

    /// Snapshot submitted for `epoch_id` but not yet finalized.
    async fn submitted_snapshot(
        &self,
        target_id: &str,
        epoch_id: u64,
    ) -> Result<Option<PoolSnapshot>, FetchError>;

    /// Pointer to the newest finalized aggregate for the target.
    async fn last_finalized_aggregate(
        &self,
        target_id: &str,
    ) -> Result<Option<AggregateRef>, FetchError>;

    /// Resolve an aggregate payload by content identifier.
    async fn resolve_aggregate(&self, cid: &str) -> Result<Option<AprAggregate>, FetchError>;
}

pub type SnapshotStoreObj = Arc<dyn SnapshotStore>;

/// Epoch bookkeeping sourced from the protocol state contract.
#[async_trait]
pub trait EpochOracle: Send + Sync {
    /// Tail epoch of a `window_secs` trailing window evaluated at
    /// `current_epoch`.
    async fn tail_epoch(
        &self,
        current_epoch: u64,
        window_secs: u64,
        target_id: &str,
    ) -> Result<TailEpoch, FetchError>;

    /// Chain geometry for the target's source chain.
    async fn window_sizing(&self, target_id: &str) -> Result<WindowSizing, FetchError>;
}

pub type EpochOracleObj = Arc<dyn EpochOracle>;

/// Advisory, time-bounded mutual exclusion for from-scratch rebuilds.
///
/// Best effort, not a strict lock: a holder that crashes is healed by the
/// TTL. Typically backed by a key-value store `SET NX EX`.
#[async_trait]
pub trait RebuildGuard: Send + Sync {
    /// Try to claim the rebuild marker for a target. Returns `false` when a
    /// live marker is already set.
    async fn try_acquire(&self, target_id: &str, ttl: Duration) -> Result<bool, FetchError>;

    /// Clear the marker after a successful rebuild.
    async fn release(&self, target_id: &str) -> Result<(), FetchError>;
}

pub type RebuildGuardObj = Arc<dyn RebuildGuard>;
