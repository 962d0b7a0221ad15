//! commitment hash over field elements
//!
//! blake3 in xof mode, wide-reduced into the field. callers rely only on
//! determinism and one-wayness, so an arithmetic hash (poseidon) can be
//! swapped in here without touching the rest of the crate.

use crate::field::FieldElement;

/// default domain for note-level hashing
pub const COMMITMENT_HASH_DOMAIN: &[u8] = b"umbra.commitment-hash.v1";

/// Hash(x_1, ..., x_n)
pub fn hash(inputs: &[FieldElement]) -> FieldElement {
    hash_with_domain(COMMITMENT_HASH_DOMAIN, inputs)
}

/// domain separated hash over field elements, arity is bound into the input
pub fn hash_with_domain(domain: &[u8], inputs: &[FieldElement]) -> FieldElement {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(&(inputs.len() as u32).to_le_bytes());
    for input in inputs {
        hasher.update(&input.to_bytes());
    }
    finalize(hasher)
}

/// hash arbitrary bytes into the field
pub fn hash_bytes(domain: &[u8], bytes: &[u8]) -> FieldElement {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(bytes);
    finalize(hasher)
}

fn finalize(hasher: blake3::Hasher) -> FieldElement {
    let mut wide = [0u8; 64];
    hasher.finalize_xof().fill(&mut wide);
    FieldElement::from_uniform_bytes(&wide)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = FieldElement::from_u64(1);
        let b = FieldElement::from_u64(2);
        assert_eq!(hash(&[a, b]), hash(&[a, b]));
        assert_ne!(hash(&[a, b]), hash(&[b, a]));
    }

    #[test]
    fn test_arity_and_domain_separated() {
        let a = FieldElement::from_u64(7);
        assert_ne!(hash(&[a]), hash(&[a, FieldElement::ZERO]));
        assert_ne!(hash(&[a]), hash_with_domain(b"other", &[a]));
    }
}
