/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Maker/taker fee calculation.
//!
//! Fees are `price * volume * rate` rounded to the nearest integer cent
//! with ties broken to even (banker's rounding), not rounded away from
//! zero. This must match exactly, including the tiny negative "fees"
//! (rebates) a maker rate below zero produces for small fills — rounding
//! the ordinary way would silently change who owes whom a cent.

use crate::types::{Fee, Price, Volume};
use serde::{Deserialize, Serialize};

/// Fractional maker/taker rates applied per trade, e.g. `-0.0001` (a 1bp
/// maker rebate) and `0.0002` (a 2bp taker fee).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeRates {
    pub maker: f64,
    pub taker: f64,
}

impl FeeRates {
    pub fn new(maker: f64, taker: f64) -> Self {
        Self { maker, taker }
    }

    pub fn maker_fee(&self, price: Price, volume: Volume) -> Fee {
        round_half_to_even(price as f64 * volume as f64 * self.maker)
    }

    pub fn taker_fee(&self, price: Price, volume: Volume) -> Fee {
        round_half_to_even(price as f64 * volume as f64 * self.taker)
    }
}

/// Rounds to the nearest integer, ties to even — matching Python's
/// built-in `round()` on a float, which the original fee calculation
/// relies on.
pub fn round_half_to_even(x: f64) -> Fee {
    let floor = x.floor();
    let diff = x - floor;
    let floor_i = floor as i64;
    if diff < 0.5 {
        floor_i
    } else if diff > 0.5 {
        floor_i + 1
    } else if floor_i % 2 == 0 {
        floor_i
    } else {
        floor_i + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_round_to_even() {
        assert_eq!(round_half_to_even(0.5), 0);
        assert_eq!(round_half_to_even(1.5), 2);
        assert_eq!(round_half_to_even(2.5), 2);
        assert_eq!(round_half_to_even(-0.5), 0);
        assert_eq!(round_half_to_even(-1.5), -2);
    }

    #[test]
    fn maker_rebate_can_be_tiny_and_negative() {
        let rates = FeeRates::new(-0.0001, 0.0002);
        let fee = rates.maker_fee(10_000, 1);
        assert_eq!(fee, -1);
    }

    #[test]
    fn taker_fee_is_positive() {
        let rates = FeeRates::new(-0.0001, 0.0002);
        let fee = rates.taker_fee(10_000, 1);
        assert_eq!(fee, 2);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Integers are already their own nearest integer, tie-breaking
        /// never enters into it.
        #[test]
        fn integers_round_to_themselves(n in -1_000_000_000_i64..1_000_000_000_i64) {
            prop_assert_eq!(round_half_to_even(n as f64), n);
        }

        /// A `.5` tie always rounds to whichever neighbor is even.
        #[test]
        fn exact_ties_round_to_even(n in -1_000_000_i64..1_000_000_i64) {
            let rounded = round_half_to_even(n as f64 + 0.5);
            let expected = if n % 2 == 0 { n } else { n + 1 };
            prop_assert_eq!(rounded, expected);
        }

        /// Fee rounding never drifts more than half a cent from the exact
        /// fractional fee it replaces.
        #[test]
        fn fee_is_within_half_unit_of_exact_value(
            price in 1_i64..1_000_000_i64,
            volume in 1_i64..1_000_i64,
            rate in -0.01_f64..0.01_f64,
        ) {
            let exact = price as f64 * volume as f64 * rate;
            let rates = FeeRates::new(rate, rate);
            let fee = rates.maker_fee(price, volume);
            prop_assert!((fee as f64 - exact).abs() <= 0.5 + 1e-9);
        }
    }
}
