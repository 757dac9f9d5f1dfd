//! Fixed-point monetary values.
//!
//! Amounts cross the wire as `f64`, but every balance comparison and every
//! piece of arithmetic goes through [`Coin`], a decimal pinned to two
//! fractional digits. Equal textual forms imply equal values.

use std::fmt;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::config;

/// Fraction of a transferred amount reserved as a forging fee. No fee is
/// deducted anywhere yet; [`Coin::fee`] exists so the API layer can
/// preview charges.
const FEE_PERCENTAGE: f64 = 0.01;

/// A monetary value with exactly two fractional decimal digits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Coin(Decimal);

impl Coin {
    /// Converts a float to a coin, rescaling to two fractional digits.
    pub fn new(value: f64) -> Self {
        Self(rescale(value))
    }

    /// The zero value.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Returns a new coin with `value` added.
    pub fn add(&self, value: f64) -> Coin {
        Self(self.0 + rescale(value))
    }

    /// Returns a new coin with `value` subtracted.
    pub fn sub(&self, value: f64) -> Coin {
        Self(self.0 - rescale(value))
    }

    /// The coin as a float, for wire encoding.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// True when the value is strictly below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// The forging fee this amount would carry. Currently unused by the
    /// block application path.
    pub fn fee(&self) -> Coin {
        Coin::new(self.to_f64() * FEE_PERCENTAGE)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Normalized so 10.00 and 10.0 print identically.
        write!(f, "{}", self.0.normalize())
    }
}

fn rescale(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(config::COIN_SCALE)
}
