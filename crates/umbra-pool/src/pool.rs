//! shielded pool state machine
//!
//! every entry point takes `&mut PoolState` and `&mut` ledger, so a
//! transaction is verified and applied without interleaving. a
//! transaction moves through
//!
//! ```text
//! Proposed ──verify──▶ Verified ──apply──▶ Applied (receipt)
//!     └──────────────────┴──────────────▶ Rejected (PoolError)
//! ```
//!
//! verification runs every fallible check, including a dry run of all
//! token transfers, before the first mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bridge::{MessageId, OutboundMessage};
use crate::commitment::{MerkleRoot, MerkleTree};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::events::{EventLog, PoolEvent};
use crate::ext_data::ExtData;
use crate::keys::Keypair;
use crate::ledger::{AccountId, Ledger, LedgerError};
use crate::note::NoteCommitment;
use crate::nullifier::{Nullifier, NullifierSet};
use crate::proof::{Arity, Proof, ProofVerifier, PublicSignals};
use crate::value::{self, Amount};

/// proof, public signals and ext data of one transaction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactArgs {
    pub proof: Proof,
    pub signals: PublicSignals,
    pub ext_data: ExtData,
}

impl TransactArgs {
    /// bridge payload encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| PoolError::Decode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| PoolError::Decode(e.to_string()))
    }
}

/// account binding a ledger address to a shielded address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: AccountId,
    /// `Keypair::address()` output
    pub public_key: String,
}

/// what an applied transaction did
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactReceipt {
    /// (commitment, leaf index) in insertion order
    pub new_commitments: Vec<(NoteCommitment, u64)>,
    pub new_nullifiers: Vec<Nullifier>,
    /// signed ext amount, >0 deposit, <0 withdrawal
    pub public_amount: i128,
    pub root: MerkleRoot,
    /// queued l1 withdrawal, if any
    pub outbound: Option<MessageId>,
}

/// global pool state
#[derive(Clone, Debug)]
pub struct PoolState {
    tree: MerkleTree,
    nullifiers: NullifierSet,
    events: EventLog,
    registry: HashMap<AccountId, String>,
    /// funds owed to note holders, excludes bridged funds not yet shielded
    shielded_balance: Amount,
    outbox: Vec<OutboundMessage>,
    outbound_nonce: u64,
}

impl PoolState {
    pub fn new(config: &PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tree: MerkleTree::new(config.tree_height, config.root_history_size)?,
            nullifiers: NullifierSet::new(),
            events: EventLog::new(),
            registry: HashMap::new(),
            shielded_balance: Amount::ZERO,
            outbox: Vec::new(),
            outbound_nonce: 0,
        })
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn nullifiers(&self) -> &NullifierSet {
        &self.nullifiers
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn root(&self) -> MerkleRoot {
        self.tree.root()
    }

    pub fn is_spent(&self, nullifier: &Nullifier) -> bool {
        self.nullifiers.contains(nullifier)
    }

    pub fn registered_address(&self, owner: &AccountId) -> Option<&str> {
        self.registry.get(owner).map(String::as_str)
    }

    pub fn shielded_balance(&self) -> Amount {
        self.shielded_balance
    }

    /// queued l2 -> l1 messages, oldest first
    pub fn outbox(&self) -> &[OutboundMessage] {
        &self.outbox
    }

    fn queue_outbound(
        &mut self,
        recipient: AccountId,
        amount: Amount,
        l1_fee: Amount,
    ) -> MessageId {
        let message = OutboundMessage::new(self.outbound_nonce, recipient, amount, l1_fee);
        self.outbound_nonce += 1;
        let id = message.id;
        self.outbox.push(message);
        id
    }
}

/// where a deposit's funds come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Funding {
    /// pulled from the caller during apply
    Caller(AccountId),
    /// already transferred to the pool by the bridge
    Bridged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Transfer {
    from: AccountId,
    to: AccountId,
    amount: Amount,
}

struct Proposed<'a> {
    args: &'a TransactArgs,
    funding: Funding,
}

/// passed every check; holds the dry-run settlement
struct Verified<'a> {
    args: &'a TransactArgs,
    transfers: Vec<Transfer>,
    shielded_balance: Amount,
    outbound: Option<(AccountId, Amount, Amount)>,
}

/// proof-gated pool logic over a [`PoolState`]
pub struct Pool {
    config: PoolConfig,
    verifier2: Box<dyn ProofVerifier + Send + Sync>,
    verifier16: Box<dyn ProofVerifier + Send + Sync>,
}

impl Pool {
    pub fn new<V2, V16>(config: PoolConfig, verifier2: V2, verifier16: V16) -> Result<Self>
    where
        V2: ProofVerifier + Send + Sync + 'static,
        V16: ProofVerifier + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            verifier2: Box::new(verifier2),
            verifier16: Box::new(verifier16),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// fresh state matching this pool's configuration
    pub fn genesis(&self) -> Result<PoolState> {
        PoolState::new(&self.config)
    }

    /// shielded transaction paid for by `caller` when it deposits
    pub fn transact<L: Ledger>(
        &self,
        state: &mut PoolState,
        ledger: &mut L,
        caller: &AccountId,
        args: &TransactArgs,
    ) -> Result<TransactReceipt> {
        let proposed = Proposed {
            args,
            funding: Funding::Caller(*caller),
        };
        let verified = self.verify(state, ledger, proposed).inspect_err(|e| {
            warn!("transaction rejected: {}", e);
        })?;
        self.apply(state, ledger, verified)
    }

    /// bridge callback: the bridge already moved `amount` to the pool and
    /// now asks it to shield the funds as described by `payload`
    pub fn on_token_bridged<L: Ledger>(
        &self,
        state: &mut PoolState,
        ledger: &mut L,
        caller: &AccountId,
        token: &AccountId,
        amount: Amount,
        payload: &[u8],
    ) -> Result<TransactReceipt> {
        let result = self.bridged(state, ledger, caller, token, amount, payload);
        if let Err(e) = &result {
            warn!("bridged deposit rejected: {}", e);
        }
        result
    }

    fn bridged<L: Ledger>(
        &self,
        state: &mut PoolState,
        ledger: &mut L,
        caller: &AccountId,
        token: &AccountId,
        amount: Amount,
        payload: &[u8],
    ) -> Result<TransactReceipt> {
        if *caller != self.config.bridge_account {
            return Err(PoolError::UnauthorizedCaller(*caller));
        }
        if *token != self.config.token || ledger.token() != self.config.token {
            return Err(PoolError::UnsupportedToken(*token));
        }
        let args = TransactArgs::decode(payload)?;
        if args.ext_data.ext_amount < 0 || args.ext_data.ext_amount as u128 != amount.0 {
            return Err(PoolError::ExactAmountMismatch {
                ext_amount: args.ext_data.ext_amount,
                amount,
            });
        }

        let held = ledger.balance_of(&self.config.pool_account);
        let unaccounted = held.saturating_sub(state.shielded_balance);
        if unaccounted < amount {
            return Err(PoolError::InsufficientBridgedFunds {
                available: unaccounted,
                required: amount,
            });
        }

        let proposed = Proposed {
            args: &args,
            funding: Funding::Bridged,
        };
        let verified = self.verify(state, ledger, proposed)?;
        self.apply(state, ledger, verified)
    }

    /// bind `account.owner` to a shielded address
    pub fn register(
        &self,
        state: &mut PoolState,
        caller: &AccountId,
        account: &Account,
    ) -> Result<()> {
        self.check_registration(caller, account)?;
        record_registration(state, account);
        Ok(())
    }

    /// register and transact as one unit: the registration is recorded
    /// only if the transaction is applied
    pub fn register_and_transact<L: Ledger>(
        &self,
        state: &mut PoolState,
        ledger: &mut L,
        caller: &AccountId,
        account: &Account,
        args: &TransactArgs,
    ) -> Result<TransactReceipt> {
        self.check_registration(caller, account)?;
        let receipt = self.transact(state, ledger, caller, args)?;
        record_registration(state, account);
        Ok(receipt)
    }

    fn check_registration(&self, caller: &AccountId, account: &Account) -> Result<()> {
        if account.owner != *caller {
            return Err(PoolError::UnauthorizedCaller(*caller));
        }
        Keypair::from_string(&account.public_key)
            .map_err(|e| PoolError::Decode(e.to_string()))?;
        Ok(())
    }

    fn verifier(&self, arity: Arity) -> &(dyn ProofVerifier + Send + Sync) {
        match arity {
            Arity::Two => self.verifier2.as_ref(),
            Arity::Sixteen => self.verifier16.as_ref(),
        }
    }

    /// Proposed -> Verified. never mutates
    fn verify<'a, L: Ledger>(
        &self,
        state: &PoolState,
        ledger: &L,
        proposed: Proposed<'a>,
    ) -> Result<Verified<'a>> {
        let Proposed { args, funding } = proposed;
        let signals = &args.signals;
        let ext = &args.ext_data;

        let arity = signals
            .arity()
            .ok_or(PoolError::InvalidArity(signals.input_nullifiers.len()))?;

        if signals.ext_data_hash != ext.hash() {
            return Err(PoolError::ExtDataHashMismatch);
        }

        if ext.fee > Amount::MAX {
            return Err(PoolError::InvalidFee);
        }
        if ext.ext_amount.unsigned_abs() >= Amount::MAX.0 {
            return Err(PoolError::InvalidExtAmount);
        }
        if signals.public_amount != value::public_amount_signal(ext.ext_amount, ext.fee) {
            return Err(PoolError::PublicAmountMismatch);
        }

        let deposit = ext.deposit_amount();
        let withdrawal = ext.withdrawal_amount();
        if deposit > self.config.maximum_deposit_amount {
            return Err(PoolError::DepositLimitExceeded {
                amount: deposit,
                limit: self.config.maximum_deposit_amount,
            });
        }
        let l1_withdrawal = ext.is_withdrawal() && ext.is_l1_withdrawal;
        if ext.is_withdrawal() {
            if ext.recipient.is_zero() {
                return Err(PoolError::MissingRecipient);
            }
            if l1_withdrawal {
                if withdrawal < self.config.minimal_withdrawal_amount {
                    return Err(PoolError::WithdrawalBelowMinimum {
                        amount: withdrawal,
                        minimum: self.config.minimal_withdrawal_amount,
                    });
                }
                if ext.l1_fee > withdrawal {
                    return Err(PoolError::InvalidFee);
                }
            }
        }
        debug!(
            "transaction bounds ok: arity {}, ext amount {}, fee {}",
            arity.inputs(),
            ext.ext_amount,
            ext.fee
        );

        if !state.tree.is_known_root(&signals.root) {
            return Err(PoolError::StaleRoot);
        }
        if let Some(spent) = state.nullifiers.first_conflict(&signals.input_nullifiers) {
            return Err(PoolError::DoubleSpend(spent));
        }
        state.tree.ensure_capacity(signals.output_commitments.len())?;

        // accounted balance after this transaction
        let inflow = state
            .shielded_balance
            .checked_add(deposit)
            .ok_or(PoolError::InvalidExtAmount)?;
        let outflow = withdrawal
            .checked_add(ext.fee)
            .ok_or(PoolError::InvalidFee)?;
        let shielded_balance = inflow.checked_sub(outflow).ok_or(
            PoolError::InsufficientPoolBalance {
                available: inflow,
                required: outflow,
            },
        )?;

        let pool = self.config.pool_account;
        let mut transfers = Vec::with_capacity(3);
        if let Funding::Caller(caller) = funding {
            if !deposit.is_zero() {
                transfers.push(Transfer {
                    from: caller,
                    to: pool,
                    amount: deposit,
                });
            }
        }
        if !withdrawal.is_zero() {
            let to = if l1_withdrawal {
                self.config.bridge_account
            } else {
                ext.recipient
            };
            transfers.push(Transfer {
                from: pool,
                to,
                amount: withdrawal,
            });
        }
        if !ext.fee.is_zero() {
            transfers.push(Transfer {
                from: pool,
                to: ext.relayer,
                amount: ext.fee,
            });
        }
        self.dry_run(ledger, &transfers)?;
        debug!("settlement dry run ok: {} transfers", transfers.len());

        if !self
            .verifier(arity)
            .verify(args.proof.as_bytes(), &signals.to_field_elements())
        {
            return Err(PoolError::InvalidProof);
        }

        let outbound = l1_withdrawal.then_some((ext.recipient, withdrawal, ext.l1_fee));
        Ok(Verified {
            args,
            transfers,
            shielded_balance,
            outbound,
        })
    }

    /// replay transfers against simulated balances
    fn dry_run<L: Ledger>(&self, ledger: &L, transfers: &[Transfer]) -> Result<()> {
        let mut balances: HashMap<AccountId, Amount> = HashMap::new();
        for t in transfers {
            let from = *balances
                .entry(t.from)
                .or_insert_with(|| ledger.balance_of(&t.from));
            let Some(debited) = from.checked_sub(t.amount) else {
                if t.from == self.config.pool_account {
                    return Err(PoolError::InsufficientPoolBalance {
                        available: from,
                        required: t.amount,
                    });
                }
                return Err(LedgerError::InsufficientBalance {
                    account: t.from,
                    available: from,
                    required: t.amount,
                }
                .into());
            };
            balances.insert(t.from, debited);
            let to = balances
                .entry(t.to)
                .or_insert_with(|| ledger.balance_of(&t.to));
            *to = to.checked_add(t.amount).ok_or(LedgerError::Overflow(t.to))?;
        }
        Ok(())
    }

    /// Verified -> Applied
    fn apply<L: Ledger>(
        &self,
        state: &mut PoolState,
        ledger: &mut L,
        verified: Verified<'_>,
    ) -> Result<TransactReceipt> {
        let Verified {
            args,
            transfers,
            shielded_balance,
            outbound,
        } = verified;

        settle(ledger, &transfers)?;

        let first_index = state.tree.len();
        let root = match state.tree.insert_batch(&args.signals.output_commitments) {
            Ok(root) => root,
            Err(e) => {
                unwind(ledger, &transfers);
                return Err(e.into());
            }
        };

        for nullifier in &args.signals.input_nullifiers {
            state.nullifiers.try_insert(*nullifier);
        }
        state.shielded_balance = shielded_balance;

        let outbound = outbound
            .map(|(recipient, amount, l1_fee)| state.queue_outbound(recipient, amount, l1_fee));

        let mut new_commitments = Vec::with_capacity(args.signals.output_commitments.len());
        for (offset, (commitment, encrypted_output)) in args
            .signals
            .output_commitments
            .iter()
            .zip(args.ext_data.encrypted_outputs())
            .enumerate()
        {
            let index = first_index + offset as u64;
            state.events.push(PoolEvent::NewCommitment {
                commitment: *commitment,
                index,
                encrypted_output: encrypted_output.to_vec(),
            });
            new_commitments.push((*commitment, index));
        }
        for nullifier in &args.signals.input_nullifiers {
            state.events.push(PoolEvent::NewNullifier {
                nullifier: *nullifier,
            });
        }

        info!(
            "transaction applied: ext amount {}, fee {}, leaves {}..{}, root {}",
            args.ext_data.ext_amount,
            args.ext_data.fee,
            first_index,
            state.tree.len(),
            root.0
        );
        if let Some(id) = &outbound {
            info!("queued l1 withdrawal {}", id);
        }

        Ok(TransactReceipt {
            new_commitments,
            new_nullifiers: args.signals.input_nullifiers.clone(),
            public_amount: args.ext_data.ext_amount,
            root,
            outbound,
        })
    }
}

fn record_registration(state: &mut PoolState, account: &Account) {
    state
        .registry
        .insert(account.owner, account.public_key.clone());
    state.events.push(PoolEvent::PublicKey {
        owner: account.owner,
        address: account.public_key.clone(),
    });
    info!("registered shielded address for {}", account.owner);
}

/// run transfers in order, undoing earlier ones if a later one fails
fn settle<L: Ledger>(ledger: &mut L, transfers: &[Transfer]) -> Result<()> {
    for (i, t) in transfers.iter().enumerate() {
        if let Err(e) = ledger.transfer(&t.from, &t.to, t.amount) {
            unwind(ledger, &transfers[..i]);
            return Err(e.into());
        }
    }
    Ok(())
}

fn unwind<L: Ledger>(ledger: &mut L, applied: &[Transfer]) {
    for t in applied.iter().rev() {
        if let Err(e) = ledger.transfer(&t.to, &t.from, t.amount) {
            warn!("failed to unwind transfer of {} from {}: {}", t.amount, t.from, e);
        }
    }
}
