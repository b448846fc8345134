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

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Per-asset detail carried by a snapshot cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDetail {
    /// Optimal utilization ratio of the asset's rate strategy, as a plain
    /// fraction.
    pub optimal_rate: f64,
}

/// One epoch's cross-section of the pool: the closing ray rates of every
/// tracked reserve, keyed by asset address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub timestamp: u64,
    pub liquidity_rate: BTreeMap<Address, U256>,
    pub variable_borrow_rate: BTreeMap<Address, U256>,
    pub stable_borrow_rate: BTreeMap<Address, U256>,
    pub asset_details: BTreeMap<Address, AssetDetail>,
}

/// A snapshot reduced to the four de-scaled pool-wide rates the rolling
/// average tracks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSample {
    pub liquidity: f64,
    pub variable: f64,
    pub stable: f64,
    pub utilization: f64,
}

impl PoolSnapshot {
    /// Arithmetic mean of each tracked rate across the snapshot's reserves,
    /// de-scaled from ray to a plain fraction. A cross-section with no
    /// reserves cannot be averaged and is a data gap.
    pub fn rate_sample(&self) -> Result<RateSample, ServiceError> {
        Ok(RateSample {
            liquidity: mean_ray(&self.liquidity_rate)?,
            variable: mean_ray(&self.variable_borrow_rate)?,
            stable: mean_ray(&self.stable_borrow_rate)?,
            utilization: mean_utilization(&self.asset_details)?,
        })
    }
}

fn mean_ray(rates: &BTreeMap<Address, U256>) -> Result<f64, ServiceError> {
    if rates.is_empty() {
        return Err(ServiceError::DataGap("snapshot cross-section has no reserves".into()));
    }
    Ok(rates.values().map(|rate| ray_math::from_ray(*rate)).sum::<f64>() / rates.len() as f64)
}

fn mean_utilization(details: &BTreeMap<Address, AssetDetail>) -> Result<f64, ServiceError> {
    if details.is_empty() {
        return Err(ServiceError::DataGap("snapshot cross-section has no asset details".into()));
    }
    Ok(details.values().map(|detail| detail.optimal_rate).sum::<f64>() / details.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ray_math::RAY;

    #[test]
    fn sample_averages_across_reserves() {
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        let snapshot = PoolSnapshot {
            timestamp: 1_700_000_000,
            liquidity_rate: BTreeMap::from([
                (a, RAY * U256::from(2) / U256::from(100)),
                (b, RAY * U256::from(4) / U256::from(100)),
            ]),
            variable_borrow_rate: BTreeMap::from([
                (a, RAY * U256::from(6) / U256::from(100)),
                (b, RAY * U256::from(10) / U256::from(100)),
            ]),
            stable_borrow_rate: BTreeMap::from([
                (a, RAY * U256::from(8) / U256::from(100)),
                (b, RAY * U256::from(8) / U256::from(100)),
            ]),
            asset_details: BTreeMap::from([
                (a, AssetDetail { optimal_rate: 0.80 }),
                (b, AssetDetail { optimal_rate: 0.90 }),
            ]),
        };

        let sample = snapshot.rate_sample().unwrap();
        assert!((sample.liquidity - 0.03).abs() < 1e-12);
        assert!((sample.variable - 0.08).abs() < 1e-12);
        assert!((sample.stable - 0.08).abs() < 1e-12);
        assert!((sample.utilization - 0.85).abs() < 1e-12);
    }

    #[test]
    fn empty_cross_section_is_a_data_gap() {
        let snapshot = PoolSnapshot::default();
        assert!(matches!(snapshot.rate_sample(), Err(ServiceError::DataGap(_))));
    }
}
