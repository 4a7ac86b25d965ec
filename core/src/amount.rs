//! Fixed-point ledger amounts.
//!
//! Amounts are held as signed base units with 18 decimals, the same scale as the
//! wire format (1 ZAR = 10^18 base units), so converting a decoded wire value is
//! exact. Balances are signed because the ledger debits a non-sentinel sender by
//! the full amount even when that drives it below zero.

use bincode::{Decode, Encode};
use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

pub const DECIMALS: usize = 18;

/// 1 ZAR in base units.
pub const BASE_UNITS_PER_ZAR: i128 = 1_000_000_000_000_000_000;

#[derive(Encode, Decode, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i128);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid amount: {0}")]
pub struct ParseAmountError(String);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: i128) -> Self {
        Amount(units)
    }

    pub const fn from_zar(zar: i64) -> Self {
        Amount(zar as i128 * BASE_UNITS_PER_ZAR)
    }

    /// Interpret an unsigned wire integer as base units.
    /// Returns `None` when it does not fit the signed ledger range.
    pub fn from_wei(value: U256) -> Option<Self> {
        if value > U256::from(i128::MAX as u128) {
            return None;
        }
        Some(Amount(value.as_u128() as i128))
    }

    pub const fn base_units(self) -> i128 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// `self * numerator / denominator`, truncated toward zero.
    ///
    /// Splits the multiplication so that large amounts do not overflow.
    pub fn mul_div(self, numerator: i128, denominator: i128) -> Self {
        let whole = self.0 / denominator;
        let rest = self.0 % denominator;
        Amount(whole * numerator + rest * numerator / denominator)
    }

    /// `pct` percent of this amount, truncated.
    pub fn percent(self, pct: i128) -> Self {
        self.mul_div(pct, 100)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let units = self.0.unsigned_abs();
        let scale = BASE_UNITS_PER_ZAR as u128;
        let whole = units / scale;
        let frac = units % scale;

        if self.0 < 0 {
            write!(f, "-")?;
        }
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", frac, width = DECIMALS);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseAmountError(s.to_string());

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));

        if whole.is_empty() || frac.len() > DECIMALS {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i128 = whole.parse().map_err(|_| invalid())?;
        let frac: i128 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMALS);
            padded.parse().map_err(|_| invalid())?
        };

        let units = whole
            .checked_mul(BASE_UNITS_PER_ZAR)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(invalid)?;

        Ok(Amount(if negative { -units } else { units }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_trims_trailing_zeros() {
        assert_eq!(Amount::from_zar(10).to_string(), "10");
        assert_eq!(Amount::from_base_units(999_900_000_000_000_000).to_string(), "0.9999");
        assert_eq!(Amount::from_base_units(-1_500_000_000_000_000_000).to_string(), "-1.5");
        assert_eq!(Amount::ZERO.to_string(), "0");
        assert_eq!(Amount::from_base_units(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn parse_accepts_display_output() {
        for text in ["0", "10", "0.9999", "-1.5", "0.000000000000000001", "5.9994"] {
            let amount: Amount = text.parse().unwrap();
            assert_eq!(amount.to_string(), text);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!(".5".parse::<Amount>().is_err());
        assert!("1.0000000000000000001".parse::<Amount>().is_err());
    }

    #[test]
    fn wei_conversion_is_exact() {
        let one = Amount::from_wei(U256::from(1_000_000_000_000_000_000u64)).unwrap();
        assert_eq!(one, Amount::from_zar(1));
        assert!(Amount::from_wei(U256::MAX).is_none());
    }

    #[test]
    fn mul_div_handles_large_values() {
        let big = Amount::from_base_units(i128::MAX / 2);
        let tenth = big.mul_div(1, 10);
        assert_eq!(tenth.base_units(), (i128::MAX / 2) / 10);
        assert_eq!(Amount::from_zar(10).percent(60), Amount::from_zar(6));
    }

    #[test]
    fn serde_uses_decimal_strings() {
        let json = serde_json::to_string(&Amount::from_base_units(2_999_700_000_000_000_000)).unwrap();
        assert_eq!(json, "\"2.9997\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base_units(), 2_999_700_000_000_000_000);
    }
}
