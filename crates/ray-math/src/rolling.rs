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

//! Incremental rolling-mean maintenance.
//!
//! A trailing-window average over `n` samples is updated in O(1) as the
//! window slides: [`add`] folds a new sample in, [`remove`] folds an expired
//! sample out. Callers track the live sample count themselves.

/// Fold `sample` into an average currently covering `sample_size` samples.
pub fn add(prev_avg: f64, sample: f64, sample_size: u64) -> f64 {
    (sample_size as f64 * prev_avg + sample) / (sample_size as f64 + 1.0)
}

/// Fold `sample` out of an average currently covering `sample_size` samples.
///
/// # Panics
///
/// Panics if `sample_size <= 1`: there is no remaining window to average over.
/// Callers must check the count before removing.
pub fn remove(prev_avg: f64, sample: f64, sample_size: u64) -> f64 {
    assert!(sample_size > 1, "cannot remove a sample from a window of {sample_size}");
    (sample_size as f64 * prev_avg - sample) / (sample_size as f64 - 1.0)
}
