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

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Windowing parameters for the rolling aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    /// Trailing duration covered by one aggregate, in seconds.
    pub window_duration_secs: u64,
    /// Expiry of the advisory from-scratch rebuild marker, in seconds. A
    /// rebuild that dies without clearing its marker frees up again once this
    /// lapses.
    pub rebuild_marker_ttl_secs: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { window_duration_secs: 21_600, rebuild_marker_ttl_secs: 300 }
    }
}

impl AggregatorConfig {
    pub fn from_toml(data: &str) -> Result<Self> {
        toml::from_str(data).context("Failed to parse toml config")
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::from_toml(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_six_hours() {
        let config = AggregatorConfig::default();
        assert_eq!(config.window_duration_secs, 6 * 60 * 60);
        assert_eq!(config.rebuild_marker_ttl_secs, 300);
    }

    #[test]
    fn parses_partial_toml() {
        let config = AggregatorConfig::from_toml("window_duration_secs = 86400\n").unwrap();
        assert_eq!(config.window_duration_secs, 86_400);
        assert_eq!(config.rebuild_marker_ttl_secs, 300);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(AggregatorConfig::from_toml("window_hours = 6\n").is_err());
    }
}
