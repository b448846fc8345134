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

//! Ray-scaled (10^27) fixed-point arithmetic matching the lending pool's
//! on-chain math libraries.
//!
//! Rates and indices on the pool contracts are unsigned 256-bit integers with
//! 27 decimals of precision ("ray"). Reproducing balances off-chain requires
//! the exact rounding the contracts use: `ray_mul`/`ray_div` round half away
//! from zero by adding a half-unit before the truncating division, and the
//! interest factors use plain truncating division throughout. All operations
//! run on 512-bit intermediates so results agree with the unbounded-width
//! reference arithmetic for any representable input.

use alloy::primitives::{uint, U256, U512};

pub mod rolling;

/// Fixed-point scale used for rates and indices (10^27).
pub const RAY: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);

/// Half of [`RAY`], added before truncating division to round half away from zero.
pub const HALF_RAY: U256 = uint!(500_000_000_000_000_000_000_000_000_U256);

/// Seconds in the protocol's interest-rate year (365 days).
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Ray-scaled multiplication: `(a * b + HALF_RAY) / RAY`.
///
/// # Panics
///
/// Panics if the rounded product exceeds 256 bits, mirroring the on-chain
/// overflow revert.
pub fn ray_mul(a: U256, b: U256) -> U256 {
    let product = U512::from(a) * U512::from(b) + U512::from(HALF_RAY);
    (product / U512::from(RAY)).to::<U256>()
}

/// Ray-scaled division: `(a * RAY + b / 2) / b`.
///
/// # Panics
///
/// Panics if `b` is zero or the rounded quotient exceeds 256 bits, mirroring
/// the on-chain revert.
pub fn ray_div(a: U256, b: U256) -> U256 {
    assert!(!b.is_zero(), "ray_div division by zero");
    let numerator = U512::from(a) * U512::from(RAY) + U512::from(b) / U512::from(2u8);
    (numerator / U512::from(b)).to::<U256>()
}

/// Linearly accumulated interest factor over `[last_update, now]`:
/// `rate * elapsed / SECONDS_PER_YEAR + RAY`.
///
/// `now` must not precede `last_update`.
pub fn linear_interest(rate: U256, last_update: u64, now: u64) -> U256 {
    assert!(now >= last_update, "timestamps must be monotone");
    let elapsed = U512::from(now - last_update);
    let accrued = U512::from(rate) * elapsed / U512::from(SECONDS_PER_YEAR);
    (accrued + U512::from(RAY)).to::<U256>()
}

/// Compounded interest factor over `[last_update, now]`, approximated with the
/// same third-order binomial expansion the pool contracts use:
///
/// `(1 + x)^n ~= 1 + n*x + n*(n-1)/2*x^2 + n*(n-1)*(n-2)/6*x^3`
///
/// where `x` is the per-second rate. Identity (`RAY`) at zero elapsed time.
/// `now` must not precede `last_update`.
pub fn compound_interest(rate: U256, last_update: u64, now: u64) -> U256 {
    assert!(now >= last_update, "timestamps must be monotone");
    let exp = now - last_update;
    if exp == 0 {
        return RAY;
    }

    let exp_minus_one = exp - 1;
    let exp_minus_two = exp.saturating_sub(2);

    let year = U256::from(SECONDS_PER_YEAR);
    let base_pow_two = ray_mul(rate, rate) / (year * year);
    let base_pow_three = ray_mul(base_pow_two, rate) / year;

    let e = U512::from(exp);
    let e1 = U512::from(exp_minus_one);
    let e2 = U512::from(exp_minus_two);

    let first_term = U512::from(rate) * e / U512::from(SECONDS_PER_YEAR);
    let second_term = e * e1 * U512::from(base_pow_two) / U512::from(2u8);
    let third_term = e * e1 * e2 * U512::from(base_pow_three) / U512::from(6u8);

    (U512::from(RAY) + first_term + second_term + third_term).to::<U256>()
}

/// Widening conversion of a 256-bit unsigned integer to `f64`, exact up to
/// `f64` mantissa precision.
pub fn to_f64(x: U256) -> f64 {
    x.as_limbs().iter().rev().fold(0.0, |acc, &limb| acc * TWO_POW_64 + limb as f64)
}

/// De-scale a ray value into a plain fractional rate.
pub fn from_ray(x: U256) -> f64 {
    to_f64(x) / 1e27
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(n: u64) -> U256 {
        RAY * U256::from(n) / U256::from(100)
    }

    #[test]
    fn ray_constants() {
        assert_eq!(RAY, U256::from(10).pow(U256::from(27)));
        assert_eq!(HALF_RAY, RAY / U256::from(2));
        assert_eq!(SECONDS_PER_YEAR, 365 * 24 * 60 * 60);
    }

    #[test]
    fn ray_mul_rounds_half_away_from_zero() {
        assert_eq!(ray_mul(RAY, RAY), RAY);
        // 1 * 1.0 ray == 1
        assert_eq!(ray_mul(U256::from(1), RAY), U256::from(1));
        // 0.5 rounds up
        assert_eq!(ray_mul(U256::from(1), HALF_RAY), U256::from(1));
        // 1.5 rounds up to 2
        assert_eq!(ray_mul(U256::from(3), HALF_RAY), U256::from(2));
        assert_eq!(ray_mul(U256::ZERO, RAY), U256::ZERO);
    }

    #[test]
    fn ray_div_rounds_half_away_from_zero() {
        assert_eq!(ray_div(RAY, RAY), RAY);
        assert_eq!(
            ray_div(U256::from(1), U256::from(3)),
            uint!(333_333_333_333_333_333_333_333_333_U256)
        );
        assert_eq!(ray_div(RAY, RAY * U256::from(3)), uint!(333_333_333_333_333_333_333_333_333_U256));
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn ray_div_by_zero_panics() {
        ray_div(RAY, U256::ZERO);
    }

    #[test]
    fn mul_div_round_trip_within_one_unit() {
        let value = U256::from(10).pow(U256::from(21));
        let factor = pct(105); // 1.05 ray
        assert_eq!(ray_mul(ray_div(value, factor), factor), value);
    }

    #[test]
    fn linear_interest_identity_at_zero_elapsed() {
        assert_eq!(linear_interest(pct(10), 1_000, 1_000), RAY);
    }

    #[test]
    fn linear_interest_five_percent_over_a_year() {
        // 5% over exactly one year: 1.05 ray on the nose.
        assert_eq!(
            linear_interest(pct(5), 0, SECONDS_PER_YEAR),
            uint!(1_050_000_000_000_000_000_000_000_000_U256)
        );
    }

    #[test]
    fn compound_interest_identity_at_zero_elapsed() {
        assert_eq!(compound_interest(pct(10), 42, 42), RAY);
    }

    #[test]
    fn compound_interest_matches_reference_expansion() {
        assert_eq!(
            compound_interest(pct(5), 0, SECONDS_PER_YEAR),
            uint!(1_051_265_681_539_063_650_421_944_000_U256)
        );
        assert_eq!(
            compound_interest(pct(10), 0, SECONDS_PER_YEAR),
            uint!(1_105_162_042_821_782_412_575_504_000_U256)
        );
        assert_eq!(
            compound_interest(pct(10), 0, SECONDS_PER_YEAR / 2),
            uint!(1_051_270_255_291_306_731_247_752_000_U256)
        );
        assert_eq!(
            compound_interest(pct(4), 0, SECONDS_PER_YEAR),
            uint!(1_040_810_454_360_354_976_037_888_000_U256)
        );
    }

    #[test]
    fn compound_dominates_linear_for_positive_rates() {
        for rate in [pct(1), pct(5), pct(10), pct(50), pct(100)] {
            for elapsed in [1u64, 60, 3_600, 86_400, SECONDS_PER_YEAR, 3 * SECONDS_PER_YEAR] {
                assert!(
                    compound_interest(rate, 0, elapsed) >= linear_interest(rate, 0, elapsed),
                    "rate {rate} elapsed {elapsed}"
                );
            }
        }
    }

    #[test]
    fn to_f64_folds_limbs() {
        assert_eq!(to_f64(U256::ZERO), 0.0);
        assert_eq!(to_f64(U256::from(123_456)), 123_456.0);
        assert_eq!(to_f64(RAY), 1e27);
        assert_eq!(from_ray(RAY), 1.0);
        assert!((from_ray(pct(5)) - 0.05).abs() < 1e-15);
    }
}
