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

//! Rolling trailing-window APR aggregation over per-epoch pool snapshots.
//!
//! Each evaluation epoch produces one [`AprAggregate`]. When a usable
//! previous aggregate exists it is advanced incrementally: snapshots that
//! entered the window are folded in, snapshots that slid out of it are folded
//! back out. When no previous aggregate exists, or it is stale or
//! unresolvable, the window is rebuilt from scratch under an advisory marker
//! so concurrent evaluations do not duplicate the work.

pub mod snapshot;

pub use snapshot::{AssetDetail, PoolSnapshot, RateSample};

use std::time::Duration;

use anyhow::anyhow;
use futures_util::future::try_join_all;
use ray_math::rolling;
use serde::{Deserialize, Serialize};

use crate::{
    config::AggregatorConfig,
    providers::{AggregateRef, EpochOracleObj, RebuildGuardObj, SnapshotStoreObj, TailEpoch},
    ServiceError,
};

/// Trailing-window average rate metrics for one evaluation epoch.
///
/// Logically immutable once handed out; the next epoch's evaluation produces
/// a fresh value. `complete` is false while the target's history is shorter
/// than the nominal window, which is a valid, deliberately partial answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AprAggregate {
    pub epoch_id: u64,
    pub avg_liquidity_rate: f64,
    pub avg_variable_rate: f64,
    pub avg_stable_rate: f64,
    pub avg_utilization_rate: f64,
    pub timestamp: u64,
    pub complete: bool,
}

impl AprAggregate {
    /// Empty aggregate for an epoch, before any sample is folded in.
    pub fn new(epoch_id: u64) -> Self {
        Self {
            epoch_id,
            avg_liquidity_rate: 0.0,
            avg_variable_rate: 0.0,
            avg_stable_rate: 0.0,
            avg_utilization_rate: 0.0,
            timestamp: 0,
            complete: true,
        }
    }
}

/// Rolling-window aggregator over per-epoch pool snapshots.
pub struct AprAggregator {
    snapshots: SnapshotStoreObj,
    epochs: EpochOracleObj,
    guard: RebuildGuardObj,
    config: AggregatorConfig,
}

impl AprAggregator {
    pub fn new(
        snapshots: SnapshotStoreObj,
        epochs: EpochOracleObj,
        guard: RebuildGuardObj,
        config: AggregatorConfig,
    ) -> Self {
        Self { snapshots, epochs, guard, config }
    }

    /// Produce the aggregate for `(target_id, epoch_id)`.
    ///
    /// Returns `Ok(None)` when the evaluation was abandoned without producing
    /// a result: a collaborator fetch failed transiently, or another rebuild
    /// currently holds the advisory marker. Both are expected to be retried
    /// by the calling scheduler on a later trigger. Missing in-window data is
    /// an error, not an absent result.
    pub async fn evaluate(
        &self,
        target_id: &str,
        epoch_id: u64,
    ) -> Result<Option<AprAggregate>, ServiceError> {
        tracing::info!("Evaluating rolling apr aggregate for {} at epoch {}", target_id, epoch_id);

        match self.evaluate_inner(target_id, epoch_id).await {
            Err(ServiceError::TransientFetch(err)) => {
                tracing::warn!(
                    "Abandoning evaluation for {} at epoch {}: {}; will retry on a later trigger",
                    target_id,
                    epoch_id,
                    err
                );
                Ok(None)
            }
            other => other,
        }
    }

    async fn evaluate_inner(
        &self,
        target_id: &str,
        epoch_id: u64,
    ) -> Result<Option<AprAggregate>, ServiceError> {
        let first_epoch = self.snapshots.first_epoch(target_id).await?;
        if first_epoch == 0 {
            tracing::info!("{} has no snapshot history; building aggregate from scratch", target_id);
            return self.build_from_scratch(target_id, epoch_id).await;
        }

        let Some(prev_ref) = self.snapshots.last_finalized_aggregate(target_id).await? else {
            tracing::info!("No finalized aggregate for {}; building from scratch", target_id);
            return self.build_from_scratch(target_id, epoch_id).await;
        };

        let tail = self
            .epochs
            .tail_epoch(epoch_id, self.config.window_duration_secs, target_id)
            .await?;

        if prev_ref.epoch_id <= tail.epoch_id {
            tracing::warn!(
                "Last finalized aggregate of {} (epoch {}) predates the window tail {}; rebuilding from scratch",
                target_id,
                prev_ref.epoch_id,
                tail.epoch_id
            );
            return self.build_from_scratch(target_id, epoch_id).await;
        }

        let Some(previous) = self.snapshots.resolve_aggregate(&prev_ref.cid).await? else {
            tracing::warn!(
                "Aggregate payload {} for {} is unresolvable; rebuilding from scratch",
                prev_ref.cid,
                target_id
            );
            return self.build_from_scratch(target_id, epoch_id).await;
        };

        self.advance(target_id, epoch_id, prev_ref, previous, tail).await.map(Some)
    }

    /// Advance the previous aggregate to the current epoch: fold in every
    /// snapshot that entered the window since it was computed, fold out every
    /// snapshot the sliding tail has since passed.
    async fn advance(
        &self,
        target_id: &str,
        epoch_id: u64,
        prev_ref: AggregateRef,
        mut aggregate: AprAggregate,
        tail: TailEpoch,
    ) -> Result<AprAggregate, ServiceError> {
        aggregate.epoch_id = epoch_id;

        let sizing = self.epochs.window_sizing(target_id).await?;
        let epoch_secs = sizing
            .epoch_size_blocks
            .checked_mul(sizing.block_time_secs)
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ServiceError::Error(anyhow!("invalid window sizing for {target_id}: {sizing:?}"))
            })?;
        let expected_samples = self.config.window_duration_secs / epoch_secs;
        let observed_samples = prev_ref.epoch_id - tail.epoch_id + 1;
        let mut sample_size = expected_samples.min(observed_samples);
        tracing::debug!(
            "Using {} sample size for {} (expected {}, observed {})",
            sample_size,
            target_id,
            expected_samples,
            observed_samples
        );

        // Snapshots finalized after the previous aggregate was computed.
        let last_finalized = self.snapshots.last_finalized_epoch(target_id).await?.unwrap_or(0);
        let (finalized, finalized_through) = if last_finalized > prev_ref.epoch_id {
            let range = self
                .snapshots
                .snapshot_range(target_id, prev_ref.epoch_id + 1, last_finalized)
                .await?;
            (range, last_finalized)
        } else {
            (Vec::new(), prev_ref.epoch_id)
        };

        // Submitted-but-unfinalized snapshots through the evaluation epoch,
        // fetched concurrently and failed as one batch. A sample that is
        // simply absent is fatal: folding around it would silently understate
        // the window.
        let pending = try_join_all(
            (finalized_through + 1..=epoch_id)
                .map(|pending_epoch| self.snapshots.submitted_snapshot(target_id, pending_epoch)),
        )
        .await?;

        let mut entering: Vec<PoolSnapshot> = finalized.into_iter().flatten().collect();
        for (offset, snapshot) in pending.into_iter().enumerate() {
            let pending_epoch = finalized_through + 1 + offset as u64;
            entering.push(snapshot.ok_or_else(|| {
                ServiceError::DataGap(format!(
                    "submitted snapshot missing for epoch {pending_epoch} of {target_id}"
                ))
            })?);
        }

        let added = entering.len();
        for snapshot in &entering {
            fold_in(&mut aggregate, snapshot, &mut sample_size)?;
        }
        tracing::debug!(
            "Folded {} new snapshots into {} (sample size {})",
            added,
            target_id,
            sample_size
        );

        // Epochs the trailing window has slid past since the previous
        // aggregate. Tails that are still extrapolated have nothing to drop.
        let mut expired_tails = Vec::new();
        for passed_epoch in prev_ref.epoch_id..epoch_id {
            let passed_tail = self
                .epochs
                .tail_epoch(passed_epoch, self.config.window_duration_secs, target_id)
                .await?;
            if !passed_tail.extrapolated {
                expired_tails.push(passed_tail.epoch_id);
            }
        }
        if let (Some(&first), Some(&last)) = (expired_tails.first(), expired_tails.last()) {
            let outgoing = self.snapshots.snapshot_range(target_id, first, last).await?;
            let mut removed = 0usize;
            for snapshot in outgoing.into_iter().flatten() {
                fold_out(&mut aggregate, &snapshot, &mut sample_size)?;
                removed += 1;
            }
            tracing::debug!(
                "Folded {} expired snapshots out of {} (sample size {})",
                removed,
                target_id,
                sample_size
            );
        }

        aggregate.complete = !tail.extrapolated;
        Ok(aggregate)
    }

    /// Rebuild the whole window from the tail epoch forward.
    ///
    /// Guarded by the advisory marker: a concurrent rebuild observing a live
    /// marker returns nothing instead of duplicating the work. The marker is
    /// released only on success; an aborted rebuild self-heals when the TTL
    /// lapses.
    async fn build_from_scratch(
        &self,
        target_id: &str,
        epoch_id: u64,
    ) -> Result<Option<AprAggregate>, ServiceError> {
        let ttl = Duration::from_secs(self.config.rebuild_marker_ttl_secs);
        if !self.guard.try_acquire(target_id, ttl).await? {
            tracing::info!("From-scratch rebuild already in progress for {}; skipping", target_id);
            return Ok(None);
        }

        tracing::info!("Building aggregate from scratch for {} at epoch {}", target_id, epoch_id);

        let tail = self
            .epochs
            .tail_epoch(epoch_id, self.config.window_duration_secs, target_id)
            .await?;
        let current = self.snapshots.submitted_snapshot(target_id, epoch_id).await?;
        let history = if epoch_id > tail.epoch_id {
            self.snapshots.snapshot_range(target_id, tail.epoch_id, epoch_id - 1).await?
        } else {
            Vec::new()
        };

        let mut aggregate = AprAggregate::new(epoch_id);
        aggregate.complete = !tail.extrapolated;

        let mut sample_size = 0;
        for snapshot in history.into_iter().flatten() {
            fold_in(&mut aggregate, &snapshot, &mut sample_size)?;
        }
        if let Some(snapshot) = current {
            fold_in(&mut aggregate, &snapshot, &mut sample_size)?;
        }
        tracing::debug!("From-scratch sample size for {}: {}", target_id, sample_size);

        self.guard.release(target_id).await?;
        Ok(Some(aggregate))
    }
}

fn fold_in(
    aggregate: &mut AprAggregate,
    snapshot: &PoolSnapshot,
    sample_size: &mut u64,
) -> Result<(), ServiceError> {
    let sample = snapshot.rate_sample()?;
    aggregate.avg_liquidity_rate =
        rolling::add(aggregate.avg_liquidity_rate, sample.liquidity, *sample_size);
    aggregate.avg_variable_rate =
        rolling::add(aggregate.avg_variable_rate, sample.variable, *sample_size);
    aggregate.avg_stable_rate = rolling::add(aggregate.avg_stable_rate, sample.stable, *sample_size);
    aggregate.avg_utilization_rate =
        rolling::add(aggregate.avg_utilization_rate, sample.utilization, *sample_size);
    aggregate.timestamp = snapshot.timestamp;
    *sample_size += 1;
    Ok(())
}

fn fold_out(
    aggregate: &mut AprAggregate,
    snapshot: &PoolSnapshot,
    sample_size: &mut u64,
) -> Result<(), ServiceError> {
    if *sample_size <= 1 {
        return Err(ServiceError::Error(anyhow!(
            "cannot remove a sample from a window holding {sample_size} samples"
        )));
    }
    let sample = snapshot.rate_sample()?;
    aggregate.avg_liquidity_rate =
        rolling::remove(aggregate.avg_liquidity_rate, sample.liquidity, *sample_size);
    aggregate.avg_variable_rate =
        rolling::remove(aggregate.avg_variable_rate, sample.variable, *sample_size);
    aggregate.avg_stable_rate =
        rolling::remove(aggregate.avg_stable_rate, sample.stable, *sample_size);
    aggregate.avg_utilization_rate =
        rolling::remove(aggregate.avg_utilization_rate, sample.utilization, *sample_size);
    *sample_size -= 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::pool_snapshot as snapshot;

    #[test]
    fn fold_in_builds_running_mean_and_tracks_timestamp() {
        let mut aggregate = AprAggregate::new(7);
        let mut sample_size = 0;
        for (rate, ts) in [(2, 100), (3, 200), (4, 300)] {
            fold_in(&mut aggregate, &snapshot(rate, ts), &mut sample_size).unwrap();
        }
        assert_eq!(sample_size, 3);
        assert!((aggregate.avg_liquidity_rate - 0.03).abs() < 1e-12);
        assert!((aggregate.avg_utilization_rate - 0.03).abs() < 1e-12);
        assert_eq!(aggregate.timestamp, 300);
    }

    #[test]
    fn fold_out_drops_expired_sample() {
        let mut aggregate = AprAggregate::new(7);
        let mut sample_size = 0;
        for rate in [2, 3, 4] {
            fold_in(&mut aggregate, &snapshot(rate, 100), &mut sample_size).unwrap();
        }
        fold_out(&mut aggregate, &snapshot(2, 100), &mut sample_size).unwrap();
        assert_eq!(sample_size, 2);
        assert!((aggregate.avg_liquidity_rate - 0.035).abs() < 1e-12);
    }

    #[test]
    fn fold_out_of_single_sample_window_is_fatal() {
        let mut aggregate = AprAggregate::new(7);
        let mut sample_size = 0;
        fold_in(&mut aggregate, &snapshot(3, 100), &mut sample_size).unwrap();
        assert!(matches!(
            fold_out(&mut aggregate, &snapshot(3, 100), &mut sample_size),
            Err(ServiceError::Error(_))
        ));
    }

    #[test]
    fn aggregate_serializes_camel_case() {
        let aggregate = AprAggregate::new(42);
        let json = serde_json::to_value(&aggregate).unwrap();
        assert_eq!(json["epochId"], 42);
        assert_eq!(json["complete"], true);
        assert!(json.get("avgLiquidityRate").is_some());

        let back: AprAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(back, aggregate);
    }
}
