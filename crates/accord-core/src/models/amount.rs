use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::{CoreError, CoreErrorKind};

pub const DECIMALS: u32 = 18;
const SCALE: u128 = 10u128.pow(DECIMALS);

/// Fixed-point amount with 18 fractional decimal places, stored as scaled
/// base units. Serialized through the canonical decimal string form.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Whole units; cannot overflow since `u64::MAX * SCALE` fits in `u128`.
    pub fn from_units(units: u64) -> Self {
        Amount(units as u128 * SCALE)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_mul_count(self, count: u32) -> Option<Amount> {
        self.0.checked_mul(count as u128).map(Amount)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / SCALE;
        let fraction = self.0 % SCALE;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = CoreError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(malformed_amount(text, "empty amount"));
        }

        let whole_value = if whole.is_empty() {
            0
        } else {
            parse_digits(whole).ok_or_else(|| malformed_amount(text, "non-digit characters"))?
        };

        // Excess fractional digits truncate; short fractions zero-pad.
        let fraction = &fraction[..fraction.len().min(DECIMALS as usize)];
        let mut fraction_value = if fraction.is_empty() {
            0
        } else {
            parse_digits(fraction).ok_or_else(|| malformed_amount(text, "non-digit characters"))?
        };
        for _ in fraction.len()..DECIMALS as usize {
            fraction_value *= 10;
        }

        whole_value
            .checked_mul(SCALE)
            .and_then(|scaled| scaled.checked_add(fraction_value))
            .map(Amount)
            .ok_or_else(|| malformed_amount(text, "amount out of range"))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(|error: CoreError| D::Error::custom(error.message))
    }
}

fn parse_digits(text: &str) -> Option<u128> {
    if !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn malformed_amount(text: &str, reason: &str) -> CoreError {
    CoreError {
        task: None,
        worker: None,
        kind: CoreErrorKind::Validation,
        message: format!("malformed amount '{text}': {reason}"),
    }
}
