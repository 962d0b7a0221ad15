//! umbra shielded pool
//!
//! utxo-style shielded pool for a single fungible token, with deposits and
//! withdrawals bridged between an l1 and the l2 the pool runs on.
//!
//! # architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        UMBRA POOL (L2)                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  client                                                       │
//! │  ├─ keypairs, notes, note encryption                          │
//! │  ├─ tree view rebuilt from the event log                      │
//! │  └─ prepare_transaction -> proof + ext data                   │
//! │                                                               │
//! │  pool (single serialized state machine)                       │
//! │  ├─ commitment tree + window of known roots                   │
//! │  ├─ nullifier set (spent notes)                               │
//! │  ├─ transact: verify -> apply, all-or-nothing                 │
//! │  └─ event log: commitments, nullifiers, registrations         │
//! │                                                               │
//! │  bridge                                                       │
//! │  ├─ l1 -> l2: transfer + on_token_bridged saga per message    │
//! │  └─ l2 -> l1: outbox, idempotent delivery on the l1 gateway   │
//! │                                                               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! commitment = Hash(amount, pubkey, blinding)
//! nullifier  = Hash(commitment, index, Hash(privkey, commitment, index))

pub mod bridge;
pub mod client;
pub mod commitment;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod events;
pub mod ext_data;
pub mod field;
pub mod hash;
pub mod keys;
pub mod ledger;
pub mod note;
pub mod nullifier;
pub mod pool;
pub mod proof;
pub mod scanner;
pub mod value;

pub use bridge::{
    BridgeCall, BridgeError, BridgeRelay, Delivery, Execution, InboundMessage, L1Gateway,
    MessageId, OutboundMessage, SagaState,
};
pub use client::{prepare_transaction, ClientError, TransactionRequest};
pub use commitment::{MerklePath, MerkleRoot, MerkleTree, TreeError};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use events::{EventLog, PoolEvent};
pub use ext_data::ExtData;
pub use field::FieldElement;
pub use keys::Keypair;
pub use ledger::{AccountId, InMemoryLedger, Ledger, LedgerError};
pub use note::{Note, NoteCommitment};
pub use nullifier::{Nullifier, NullifierSet};
pub use pool::{Account, Pool, PoolState, TransactArgs, TransactReceipt};
pub use proof::{Arity, Proof, ProofVerifier, Prover, PublicSignals};
pub use scanner::Scanner;
pub use value::Amount;
