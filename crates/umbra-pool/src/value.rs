//! value types for the shielded pool
//!
//! single fungible token, 18 decimals. amounts are unsigned; the signed
//! "ext amount" of a transaction is a plain `i128`.

use core::fmt;
use core::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::field::FieldElement;

/// token decimals
pub const DECIMALS: u32 = 18;

/// one whole token in base units
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// amount (u128 base units)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    /// upper bound for any single amount crossing the pool boundary.
    /// keeps sums over 16 inputs far away from u128/i128 overflow.
    pub const MAX: Self = Self(1 << 120);

    pub fn new(amount: u128) -> Self {
        Self(amount)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn to_field(self) -> FieldElement {
        FieldElement::from_u128(self.0)
    }

    /// parse a decimal token amount ("0.13") into base units
    pub fn parse_units(s: &str) -> Result<Self, AmountParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if frac.len() > DECIMALS as usize {
            return Err(AmountParseError::TooPrecise(frac.len()));
        }
        let digits_ok = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if !digits_ok(whole) || !digits_ok(frac) || (whole.is_empty() && frac.is_empty()) {
            return Err(AmountParseError::InvalidDigit(s.to_string()));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountParseError::Overflow)?
        };
        let mut frac_units: u128 = 0;
        if !frac.is_empty() {
            let padded = format!("{frac:0<width$}", width = DECIMALS as usize);
            frac_units = padded.parse().map_err(|_| AmountParseError::Overflow)?;
        }

        whole
            .checked_mul(UNIT)
            .and_then(|w| w.checked_add(frac_units))
            .map(Self)
            .ok_or(AmountParseError::Overflow)
    }

    /// decimal representation without trailing zeros
    pub fn format_units(&self) -> String {
        let whole = self.0 / UNIT;
        let frac = self.0 % UNIT;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{frac:0>width$}", width = DECIMALS as usize);
        format!("{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Self(v)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(v as u128)
    }
}

impl From<Amount> for u128 {
    fn from(v: Amount) -> Self {
        v.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_units())
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_units(s)
    }
}

/// human readable formats (toml, json) use decimal token strings
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.format_units())
        } else {
            serializer.serialize_u128(self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::parse_units(&s).map_err(de::Error::custom)
        } else {
            u128::deserialize(deserializer).map(Self)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AmountParseError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    InvalidDigit(String),
    #[error("too many decimal places: {0} (max 18)")]
    TooPrecise(usize),
    #[error("amount overflows u128")]
    Overflow,
}

/// public amount signal: `ext_amount - fee` in the field.
///
/// the circuit enforces `sum(in) + public_amount == sum(out)`, which is
/// `sum(in) + ext_amount == sum(out) + fee`.
pub fn public_amount_signal(ext_amount: i128, fee: Amount) -> FieldElement {
    FieldElement::from_i128(ext_amount) - fee.to_field()
}
