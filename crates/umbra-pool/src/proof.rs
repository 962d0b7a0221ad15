//! transaction proofs
//!
//! the pool never sees a witness. it checks an opaque proof against the
//! public signals `[root, public_amount, ext_data_hash, nullifiers..,
//! commitments..]` through [`ProofVerifier`]. clients produce proofs
//! through [`Prover`].
//!
//! [`dev`] ships a backend that checks the full transaction statement in
//! the clear and binds the signals with a keyed hash. it is sound only
//! as long as the key stays with honest provers and is not zero-knowledge;
//! it exists for tests and local simulation.

use serde::{Deserialize, Serialize};

use crate::commitment::{MerklePath, MerkleRoot};
use crate::field::FieldElement;
use crate::note::{Note, NoteCommitment, NoteError};
use crate::nullifier::Nullifier;
use crate::value::{self, Amount};

/// every transaction creates exactly two outputs
pub const OUTPUT_COUNT: usize = 2;

/// number of signals before the nullifiers
const HEADER_SIGNALS: usize = 3;

/// supported input counts, one verifying key each
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arity {
    Two,
    Sixteen,
}

impl Arity {
    pub fn inputs(self) -> usize {
        match self {
            Arity::Two => 2,
            Arity::Sixteen => 16,
        }
    }

    /// exact input count
    pub fn from_inputs(n: usize) -> Option<Self> {
        match n {
            2 => Some(Arity::Two),
            16 => Some(Arity::Sixteen),
            _ => None,
        }
    }

    /// smallest arity that fits `n` real inputs
    pub fn fitting(n: usize) -> Option<Self> {
        match n {
            0..=2 => Some(Arity::Two),
            3..=16 => Some(Arity::Sixteen),
            _ => None,
        }
    }

    fn tag(self) -> u8 {
        self.inputs() as u8
    }
}

/// public inputs of a transaction proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignals {
    pub root: MerkleRoot,
    /// `ext_amount - fee` wrapped into the field
    pub public_amount: FieldElement,
    pub ext_data_hash: FieldElement,
    pub input_nullifiers: Vec<Nullifier>,
    pub output_commitments: [NoteCommitment; OUTPUT_COUNT],
}

impl PublicSignals {
    pub fn arity(&self) -> Option<Arity> {
        Arity::from_inputs(self.input_nullifiers.len())
    }

    /// wire order: root, public amount, ext data hash, nullifiers, commitments
    pub fn to_field_elements(&self) -> Vec<FieldElement> {
        let mut out =
            Vec::with_capacity(HEADER_SIGNALS + self.input_nullifiers.len() + OUTPUT_COUNT);
        out.push(self.root.0);
        out.push(self.public_amount);
        out.push(self.ext_data_hash);
        out.extend(self.input_nullifiers.iter().map(|nf| nf.0));
        out.extend(self.output_commitments.iter().map(|cm| cm.0));
        out
    }

    pub fn from_field_elements(signals: &[FieldElement]) -> Result<Self, ProofError> {
        let inputs = signals
            .len()
            .checked_sub(HEADER_SIGNALS + OUTPUT_COUNT)
            .ok_or(ProofError::MalformedSignals(signals.len()))?;
        if Arity::from_inputs(inputs).is_none() {
            return Err(ProofError::MalformedSignals(signals.len()));
        }
        let (header, rest) = signals.split_at(HEADER_SIGNALS);
        let (nullifiers, commitments) = rest.split_at(inputs);
        Ok(Self {
            root: MerkleRoot(header[0]),
            public_amount: header[1],
            ext_data_hash: header[2],
            input_nullifiers: nullifiers.iter().copied().map(Nullifier).collect(),
            output_commitments: [NoteCommitment(commitments[0]), NoteCommitment(commitments[1])],
        })
    }
}

/// opaque proof bytes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub Vec<u8>);

impl Proof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// verifying key for one arity
pub trait ProofVerifier {
    fn verify(&self, proof: &[u8], signals: &[FieldElement]) -> bool;
}

impl<V: ProofVerifier + ?Sized> ProofVerifier for Box<V> {
    fn verify(&self, proof: &[u8], signals: &[FieldElement]) -> bool {
        (**self).verify(proof, signals)
    }
}

/// client-side proof generation
pub trait Prover {
    fn prove(&self, witness: &TransactionWitness, signals: &PublicSignals)
        -> Result<Proof, ProofError>;
}

/// spent note with its authentication path
#[derive(Clone, Debug)]
pub struct InputWitness {
    pub note: Note,
    pub path: MerklePath,
}

/// private inputs of a transaction proof
#[derive(Clone, Debug)]
pub struct TransactionWitness {
    pub inputs: Vec<InputWitness>,
    pub outputs: Vec<Note>,
    pub ext_amount: i128,
    pub fee: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("malformed public signals ({0} elements)")]
    MalformedSignals(usize),
    #[error("witness has {witness} inputs, signals have {signals}")]
    ArityMismatch { witness: usize, signals: usize },
    #[error("input {0} is not in the tree under the claimed root")]
    MembershipFailed(usize),
    #[error("input {0} nullifier does not match the signals")]
    NullifierMismatch(usize),
    #[error("output {0} commitment does not match the signals")]
    CommitmentMismatch(usize),
    #[error("duplicate input nullifier")]
    DuplicateNullifier,
    #[error("note amount out of range")]
    AmountOutOfRange,
    #[error("public amount does not match ext amount and fee")]
    PublicAmountMismatch,
    #[error("inputs plus public amount do not equal outputs")]
    BalanceMismatch,
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// check the transaction statement against a witness, in the clear
pub fn check_statement(
    witness: &TransactionWitness,
    signals: &PublicSignals,
) -> Result<(), ProofError> {
    if witness.inputs.len() != signals.input_nullifiers.len()
        || signals.arity().is_none()
        || witness.outputs.len() != OUTPUT_COUNT
    {
        return Err(ProofError::ArityMismatch {
            witness: witness.inputs.len(),
            signals: signals.input_nullifiers.len(),
        });
    }

    let mut sum_in = FieldElement::ZERO;
    for (i, (input, expected)) in witness
        .inputs
        .iter()
        .zip(&signals.input_nullifiers)
        .enumerate()
    {
        if input.note.amount > Amount::MAX {
            return Err(ProofError::AmountOutOfRange);
        }
        // zero notes skip membership
        if !input.note.amount.is_zero() {
            let bound = input.note.index == Some(input.path.index);
            if !bound || !input.path.verify(&input.note.commitment(), &signals.root) {
                return Err(ProofError::MembershipFailed(i));
            }
        }
        if input.note.nullifier()? != *expected {
            return Err(ProofError::NullifierMismatch(i));
        }
        sum_in += input.note.amount.to_field();
    }

    for (i, nf) in signals.input_nullifiers.iter().enumerate() {
        if signals.input_nullifiers[i + 1..].contains(nf) {
            return Err(ProofError::DuplicateNullifier);
        }
    }

    let mut sum_out = FieldElement::ZERO;
    for (i, (output, expected)) in witness
        .outputs
        .iter()
        .zip(&signals.output_commitments)
        .enumerate()
    {
        if output.amount > Amount::MAX {
            return Err(ProofError::AmountOutOfRange);
        }
        if output.commitment() != *expected {
            return Err(ProofError::CommitmentMismatch(i));
        }
        sum_out += output.amount.to_field();
    }

    if value::public_amount_signal(witness.ext_amount, witness.fee) != signals.public_amount {
        return Err(ProofError::PublicAmountMismatch);
    }
    if sum_in + signals.public_amount != sum_out {
        return Err(ProofError::BalanceMismatch);
    }
    Ok(())
}

pub mod dev {
    //! keyed-hash proof backend for tests and simulation

    use super::*;

    const DEV_KEY_CONTEXT: &str = "umbra 2024-06 dev proving key v1";

    fn derive_key(seed: &[u8], arity: Arity) -> [u8; 32] {
        let mut material = Vec::with_capacity(seed.len() + 1);
        material.extend_from_slice(seed);
        material.push(arity.tag());
        blake3::derive_key(DEV_KEY_CONTEXT, &material)
    }

    fn tag(key: &[u8; 32], signals: &[FieldElement]) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(key);
        hasher.update(&(signals.len() as u32).to_le_bytes());
        for s in signals {
            hasher.update(&s.to_bytes());
        }
        hasher.finalize()
    }

    /// proving keys for both arities
    #[derive(Clone)]
    pub struct DevProver {
        key2: [u8; 32],
        key16: [u8; 32],
    }

    /// verifying key for one arity
    #[derive(Clone)]
    pub struct DevVerifier {
        key: [u8; 32],
    }

    /// matching prover and verifiers from one setup seed
    pub fn setup(seed: &[u8]) -> (DevProver, DevVerifier, DevVerifier) {
        let key2 = derive_key(seed, Arity::Two);
        let key16 = derive_key(seed, Arity::Sixteen);
        (
            DevProver { key2, key16 },
            DevVerifier { key: key2 },
            DevVerifier { key: key16 },
        )
    }

    impl Prover for DevProver {
        fn prove(
            &self,
            witness: &TransactionWitness,
            signals: &PublicSignals,
        ) -> Result<Proof, ProofError> {
            check_statement(witness, signals)?;
            let key = match signals.arity() {
                Some(Arity::Two) => &self.key2,
                Some(Arity::Sixteen) => &self.key16,
                None => {
                    return Err(ProofError::MalformedSignals(
                        signals.to_field_elements().len(),
                    ))
                }
            };
            let proof = tag(key, &signals.to_field_elements());
            Ok(Proof(proof.as_bytes().to_vec()))
        }
    }

    impl ProofVerifier for DevVerifier {
        fn verify(&self, proof: &[u8], signals: &[FieldElement]) -> bool {
            let Ok(bytes) = <[u8; 32]>::try_from(proof) else {
                return false;
            };
            // blake3::Hash equality is constant time
            blake3::Hash::from(bytes) == tag(&self.key, signals)
        }
    }

    impl core::fmt::Debug for DevProver {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.write_str("DevProver")
        }
    }

    impl core::fmt::Debug for DevVerifier {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.write_str("DevVerifier")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::dev;
    use super::*;
    use crate::commitment::MerkleTree;
    use crate::keys::Keypair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        witness: TransactionWitness,
        signals: PublicSignals,
    }

    /// spend a 100 note into 70 + 20 and withdraw 10
    fn fixture() -> Fixture {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let kp = Keypair::random(&mut rng);
        let mut tree = MerkleTree::new(5, 10).unwrap();
        let deposit = Note::new(Amount(100), kp.clone(), &mut rng);
        let pad = Note::new(Amount::ZERO, kp.clone(), &mut rng);
        tree.insert_batch(&[deposit.commitment(), pad.commitment()]).unwrap();

        let spent = deposit.at_index(0);
        let zero = Note::zero(&mut rng);
        let outputs = vec![
            Note::new(Amount(70), kp.clone(), &mut rng),
            Note::new(Amount(20), kp, &mut rng),
        ];
        let signals = PublicSignals {
            root: tree.root(),
            public_amount: value::public_amount_signal(-10, Amount::ZERO),
            ext_data_hash: FieldElement::from_u64(1),
            input_nullifiers: vec![spent.nullifier().unwrap(), zero.nullifier().unwrap()],
            output_commitments: [outputs[0].commitment(), outputs[1].commitment()],
        };
        let witness = TransactionWitness {
            inputs: vec![
                InputWitness {
                    path: tree.path(0).unwrap(),
                    note: spent,
                },
                InputWitness {
                    note: zero,
                    path: MerklePath::empty(5),
                },
            ],
            outputs,
            ext_amount: -10,
            fee: Amount::ZERO,
        };
        Fixture { witness, signals }
    }

    #[test]
    fn test_signals_wire_order() {
        let f = fixture();
        let elems = f.signals.to_field_elements();
        assert_eq!(elems.len(), 7);
        assert_eq!(elems[0], f.signals.root.0);
        assert_eq!(elems[3], f.signals.input_nullifiers[0].0);
        assert_eq!(elems[6], f.signals.output_commitments[1].0);
        assert_eq!(PublicSignals::from_field_elements(&elems).unwrap(), f.signals);
        assert_eq!(
            PublicSignals::from_field_elements(&elems[..6]),
            Err(ProofError::MalformedSignals(6))
        );
    }

    #[test]
    fn test_dev_prove_verify() {
        let f = fixture();
        let (prover, v2, v16) = dev::setup(b"test");
        let proof = prover.prove(&f.witness, &f.signals).unwrap();
        let elems = f.signals.to_field_elements();

        assert!(v2.verify(proof.as_bytes(), &elems));
        assert!(!v16.verify(proof.as_bytes(), &elems));

        let mut tampered = elems.clone();
        tampered[1] = FieldElement::from_u64(5);
        assert!(!v2.verify(proof.as_bytes(), &tampered));
        assert!(!v2.verify(&proof.as_bytes()[..31], &elems));

        let (_, other, _) = dev::setup(b"other");
        assert!(!other.verify(proof.as_bytes(), &elems));
    }

    #[test]
    fn test_statement_rejects_imbalance() {
        let mut f = fixture();
        f.signals.public_amount = value::public_amount_signal(-11, Amount::ZERO);
        f.witness.ext_amount = -11;
        assert_eq!(
            check_statement(&f.witness, &f.signals),
            Err(ProofError::BalanceMismatch)
        );
    }

    #[test]
    fn test_statement_rejects_wrong_root() {
        let mut f = fixture();
        f.signals.root = MerkleRoot(FieldElement::from_u64(3));
        assert_eq!(
            check_statement(&f.witness, &f.signals),
            Err(ProofError::MembershipFailed(0))
        );
    }

    #[test]
    fn test_statement_rejects_duplicate_inputs() {
        let mut f = fixture();
        let first = f.witness.inputs[0].clone();
        f.witness.inputs[1] = first;
        f.signals.input_nullifiers[1] = f.signals.input_nullifiers[0];
        assert_eq!(
            check_statement(&f.witness, &f.signals),
            Err(ProofError::DuplicateNullifier)
        );
    }
}
