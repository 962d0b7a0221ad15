//! field elements
//!
//! commitments, nullifiers, roots and public signals all live in the
//! pallas base field. negative public amounts wrap around the modulus.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::{Add, AddAssign, Neg, Sub};
use core::str::FromStr;

use ff::{Field, FromUniformBytes, PrimeField};
use pasta_curves::Fp;
use rand::{CryptoRng, RngCore};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// element of the pallas base field
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldElement(pub Fp);

impl FieldElement {
    pub const ZERO: Self = Self(Fp::ZERO);
    pub const ONE: Self = Self(Fp::ONE);

    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(Fp::random(rng))
    }

    pub fn from_u64(v: u64) -> Self {
        Self(Fp::from(v))
    }

    pub fn from_u128(v: u128) -> Self {
        Self(Fp::from_u128(v))
    }

    /// signed value, negatives become `p - |v|`
    pub fn from_i128(v: i128) -> Self {
        let magnitude = Self::from_u128(v.unsigned_abs());
        if v < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// wide reduction of 64 uniform bytes
    pub fn from_uniform_bytes(wide: &[u8; 64]) -> Self {
        Self(Fp::from_uniform_bytes(wide))
    }

    /// canonical little-endian encoding
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr()
    }

    /// rejects non-canonical encodings
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        Option::from(Fp::from_repr(*bytes)).map(Self)
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// big-endian hex with 0x prefix (fixed width)
    pub fn to_hex(&self) -> String {
        let mut be = self.to_bytes();
        be.reverse();
        format!("0x{}", hex::encode(be))
    }
}

impl From<Fp> for FieldElement {
    fn from(v: Fp) -> Self {
        Self(v)
    }
}

impl From<u64> for FieldElement {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for FieldElement {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for FieldElement {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl core::iter::Sum for FieldElement {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

impl Hash for FieldElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_bytes().hash(state);
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

/// error parsing a hex field element
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FieldParseError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected at most 32 bytes, got {0}")]
    TooLong(usize),
    #[error("value is not a canonical field element")]
    NonCanonical,
}

impl FromStr for FieldElement {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let digits = if digits.len() % 2 == 1 {
            format!("0{digits}")
        } else {
            digits.to_string()
        };
        let bytes = hex::decode(&digits).map_err(|e| FieldParseError::Hex(e.to_string()))?;
        if bytes.len() > 32 {
            return Err(FieldParseError::TooLong(bytes.len()));
        }
        // big-endian input, right aligned
        let mut le = [0u8; 32];
        for (i, b) in bytes.iter().rev().enumerate() {
            le[i] = *b;
        }
        Self::from_bytes(&le).ok_or(FieldParseError::NonCanonical)
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.to_bytes().serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let bytes = <[u8; 32]>::deserialize(deserializer)?;
            Self::from_bytes(&bytes)
                .ok_or_else(|| de::Error::custom(FieldParseError::NonCanonical))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_wraps() {
        let minus_one = FieldElement::from_i128(-1);
        assert_eq!(minus_one + FieldElement::ONE, FieldElement::ZERO);

        let a = FieldElement::from_i128(-80);
        let b = FieldElement::from_u128(80);
        assert_eq!(a + b, FieldElement::ZERO);
        assert_eq!(FieldElement::from_i128(42), FieldElement::from_u64(42));
    }

    #[test]
    fn test_hex_roundtrip() {
        let x = FieldElement::from_u128(0xdead_beef);
        let s = x.to_hex();
        assert_eq!(s.len(), 66);
        assert!(s.ends_with("deadbeef"));
        assert_eq!(s.parse::<FieldElement>().unwrap(), x);
        assert_eq!("0xdeadbeef".parse::<FieldElement>().unwrap(), x);
    }

    #[test]
    fn test_non_canonical_rejected() {
        assert!(FieldElement::from_bytes(&[0xff; 32]).is_none());
        assert_eq!(
            "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
                .parse::<FieldElement>(),
            Err(FieldParseError::NonCanonical)
        );
    }
}
