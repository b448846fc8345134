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

//! Off-chain reconstruction of lending-pool reserve state and rolling
//! trailing-window APR aggregation.
//!
//! Two engines live here. The [`reserve`] module rebuilds per-block reserve
//! state (supply, debt, rates) from one on-chain snapshot plus the mutation
//! events emitted over a block range, using the pool's own ray fixed-point
//! accrual math. The [`aggregation`] module maintains a trailing-window
//! average of the derived rates across evaluation epochs, updating the
//! previous aggregate incrementally when it can and rebuilding from scratch
//! when state is stale or missing.
//!
//! All chain, storage and epoch access goes through the collaborator traits
//! in [`providers`]; nothing here fetches or persists anything itself.

use thiserror::Error;

pub mod aggregation;
pub mod config;
pub mod providers;
pub mod reserve;

pub mod test_utils;

use providers::FetchError;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// A collaborator read failed. Recoverable: the evaluation is abandoned
    /// and retried on a later trigger, never answered partially.
    #[error("transient fetch failure: {0}")]
    TransientFetch(#[from] FetchError),

    /// Required input data is missing: a block without a timestamp, a
    /// snapshot cross-section without reserves, an in-window sample that was
    /// never submitted. Fatal for the evaluation; never interpolated around.
    #[error("data gap: {0}")]
    DataGap(String),

    #[error("Error: {0}")]
    Error(#[from] anyhow::Error),
}
