//! client-side transaction building
//!
//! pads inputs and outputs to a supported arity, locates inputs in the
//! client's copy of the tree, encrypts outputs, binds ext data and asks
//! the prover for a proof.

use rand::{CryptoRng, RngCore};

use crate::commitment::{MerklePath, MerkleTree, TreeError};
use crate::config::PoolConfig;
use crate::encrypt::EncryptError;
use crate::events::EventLog;
use crate::ext_data::ExtData;
use crate::ledger::AccountId;
use crate::note::{Note, NoteCommitment, NoteError};
use crate::pool::TransactArgs;
use crate::proof::{
    Arity, InputWitness, ProofError, Prover, PublicSignals, TransactionWitness, OUTPUT_COUNT,
};
use crate::value::{self, Amount};

/// what the holder wants to do
#[derive(Clone, Debug, Default)]
pub struct TransactionRequest {
    pub inputs: Vec<Note>,
    pub outputs: Vec<Note>,
    pub fee: Amount,
    pub recipient: AccountId,
    pub relayer: AccountId,
    pub is_l1_withdrawal: bool,
    pub l1_fee: Amount,
}

/// rebuild the commitment tree from the pool's event log
pub fn tree_from_events(config: &PoolConfig, events: &EventLog) -> Result<MerkleTree, ClientError> {
    let leaves: Vec<NoteCommitment> = events.commitments().map(|(cm, _, _)| *cm).collect();
    Ok(MerkleTree::from_leaves(
        config.tree_height,
        config.root_history_size,
        &leaves,
    )?)
}

/// `sum(outputs) - sum(inputs) + fee`
pub fn ext_amount(inputs: &[Note], outputs: &[Note], fee: Amount) -> Result<i128, ClientError> {
    let sum = |notes: &[Note]| {
        notes
            .iter()
            .try_fold(Amount::ZERO, |acc, n| acc.checked_add(n.amount))
            .filter(|total| *total <= Amount::MAX)
            .ok_or(ClientError::AmountOverflow)
    };
    let sum_in = sum(inputs)?.0 as i128;
    let sum_out = sum(outputs)?.0 as i128;
    if fee > Amount::MAX {
        return Err(ClientError::AmountOverflow);
    }
    Ok(sum_out - sum_in + fee.0 as i128)
}

pub fn prepare_transaction<P, R>(
    tree: &MerkleTree,
    request: TransactionRequest,
    prover: &P,
    rng: &mut R,
) -> Result<TransactArgs, ClientError>
where
    P: Prover + ?Sized,
    R: RngCore + CryptoRng,
{
    let TransactionRequest {
        mut inputs,
        mut outputs,
        fee,
        recipient,
        relayer,
        is_l1_withdrawal,
        l1_fee,
    } = request;

    let arity = Arity::fitting(inputs.len()).ok_or(ClientError::TooManyInputs(inputs.len()))?;
    if outputs.len() > OUTPUT_COUNT {
        return Err(ClientError::TooManyOutputs(outputs.len()));
    }
    while inputs.len() < arity.inputs() {
        inputs.push(Note::zero(rng));
    }
    while outputs.len() < OUTPUT_COUNT {
        outputs.push(Note::zero(rng));
    }

    let mut witnesses = Vec::with_capacity(inputs.len());
    for mut note in inputs {
        let path = if note.amount.is_zero() {
            MerklePath::empty(tree.height())
        } else {
            let commitment = note.commitment();
            let index = match note.index {
                Some(index) => index,
                None => tree
                    .index_of(&commitment)
                    .ok_or(ClientError::UnknownInput(commitment))?,
            };
            note.index = Some(index);
            tree.path(index).ok_or(ClientError::UnknownInput(commitment))?
        };
        witnesses.push(InputWitness { note, path });
    }

    let input_notes: Vec<Note> = witnesses.iter().map(|w| w.note.clone()).collect();
    let ext_amount = ext_amount(&input_notes, &outputs, fee)?;

    let ext_data = ExtData {
        recipient,
        ext_amount,
        relayer,
        fee,
        encrypted_output1: outputs[0].encrypt(rng)?,
        encrypted_output2: outputs[1].encrypt(rng)?,
        is_l1_withdrawal,
        l1_fee,
    };

    let input_nullifiers = input_notes
        .iter()
        .map(Note::nullifier)
        .collect::<Result<Vec<_>, _>>()?;
    let signals = PublicSignals {
        root: tree.root(),
        public_amount: value::public_amount_signal(ext_amount, fee),
        ext_data_hash: ext_data.hash(),
        input_nullifiers,
        output_commitments: [outputs[0].commitment(), outputs[1].commitment()],
    };

    let witness = TransactionWitness {
        inputs: witnesses,
        outputs,
        ext_amount,
        fee,
    };
    let proof = prover.prove(&witness, &signals)?;

    Ok(TransactArgs {
        proof,
        signals,
        ext_data,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("at most 16 inputs are supported, got {0}")]
    TooManyInputs(usize),
    #[error("at most {OUTPUT_COUNT} outputs are supported, got {0}")]
    TooManyOutputs(usize),
    #[error("input {0:?} is not in the tree")]
    UnknownInput(NoteCommitment),
    #[error("amounts out of range")]
    AmountOverflow,
    #[error(transparent)]
    Note(#[from] NoteError),
    #[error(transparent)]
    Encrypt(#[from] EncryptError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
