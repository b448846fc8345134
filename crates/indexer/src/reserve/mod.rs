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

//! Per-block reserve state reconstruction from mutation events.

pub mod reconstruct;
pub mod types;

pub use reconstruct::{
    current_from_scaled, initial_scaled_balances, reconstruct, reconstruct_range,
    scaled_from_current, ScaledBalances,
};
pub use types::{DebtToken, OrderedReserveEvent, ReserveEvent, ReserveState};
