//! cross-chain bridge relay
//!
//! deposits (l1 -> l2) arrive as a message carrying ordered calls: a token
//! transfer from the bridge account into the pool, then the pool's
//! `on_token_bridged` callback. each message runs as a saga keyed by its
//! id:
//!
//! ```text
//! (none) ──transfer──▶ FundsReceived ──on_token_bridged──▶ Shielded
//! ```
//!
//! a failed callback leaves the saga in `FundsReceived` with the funds in
//! the pool; replaying the message skips the transfer and retries only
//! the callback. replaying a `Shielded` message is a no-op.
//!
//! withdrawals (l2 -> l1) are queued by the pool as [`OutboundMessage`]s
//! and delivered at least once to the [`L1Gateway`], which applies each
//! id at most once.

use core::fmt;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PoolError;
use crate::ledger::{AccountId, Ledger, LedgerError};
use crate::pool::{Pool, PoolState, TransactArgs, TransactReceipt};
use crate::value::Amount;

const L1_TO_L2_DOMAIN: &[u8] = b"umbra.bridge.l1-to-l2";
const L2_TO_L1_DOMAIN: &[u8] = b"umbra.bridge.l2-to-l1";

/// bridge message identity, the idempotency key on both sides
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub [u8; 32]);

impl MessageId {
    /// blake3(domain, nonce, payload)
    pub fn derive(domain: &[u8], nonce: u64, payload: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain);
        hasher.update(&nonce.to_le_bytes());
        hasher.update(payload);
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

/// one step of an inbound message, executed by the bridge account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeCall {
    /// token transfer from the bridge account
    Transfer { to: AccountId, amount: Amount },
    /// pool callback for funds that already arrived
    TokenBridged {
        token: AccountId,
        amount: Amount,
        payload: Vec<u8>,
    },
}

impl BridgeCall {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            BridgeCall::Transfer { to, amount } => {
                out.push(0);
                out.extend_from_slice(&to.0);
                out.extend_from_slice(&amount.0.to_le_bytes());
            }
            BridgeCall::TokenBridged {
                token,
                amount,
                payload,
            } => {
                out.push(1);
                out.extend_from_slice(&token.0);
                out.extend_from_slice(&amount.0.to_le_bytes());
                out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
                out.extend_from_slice(payload);
            }
        }
    }
}

/// l1 -> l2 message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub nonce: u64,
    pub calls: Vec<BridgeCall>,
}

impl InboundMessage {
    pub fn new(nonce: u64, calls: Vec<BridgeCall>) -> Self {
        let id = MessageId::derive(L1_TO_L2_DOMAIN, nonce, &encode_calls(&calls));
        Self { id, nonce, calls }
    }

    /// transfer into the pool, then shield
    pub fn deposit(
        nonce: u64,
        pool_account: AccountId,
        token: AccountId,
        amount: Amount,
        args: &TransactArgs,
    ) -> Result<Self, BridgeError> {
        let payload = args.encode().map_err(BridgeError::Encode)?;
        Ok(Self::new(
            nonce,
            vec![
                BridgeCall::Transfer {
                    to: pool_account,
                    amount,
                },
                BridgeCall::TokenBridged {
                    token,
                    amount,
                    payload,
                },
            ],
        ))
    }

    /// id matches the message contents
    pub fn is_authentic(&self) -> bool {
        MessageId::derive(L1_TO_L2_DOMAIN, self.nonce, &encode_calls(&self.calls)) == self.id
    }
}

fn encode_calls(calls: &[BridgeCall]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(calls.len() as u32).to_le_bytes());
    for call in calls {
        call.encode_into(&mut out);
    }
    out
}

/// l2 -> l1 withdrawal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub nonce: u64,
    /// l1 recipient
    pub recipient: AccountId,
    pub amount: Amount,
    /// paid to the l1 relayer out of `amount`
    pub l1_fee: Amount,
}

impl OutboundMessage {
    pub fn new(nonce: u64, recipient: AccountId, amount: Amount, l1_fee: Amount) -> Self {
        let id = MessageId::derive(
            L2_TO_L1_DOMAIN,
            nonce,
            &Self::payload(&recipient, amount, l1_fee),
        );
        Self {
            id,
            nonce,
            recipient,
            amount,
            l1_fee,
        }
    }

    fn payload(recipient: &AccountId, amount: Amount, l1_fee: Amount) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + 16 + 16);
        out.extend_from_slice(&recipient.0);
        out.extend_from_slice(&amount.0.to_le_bytes());
        out.extend_from_slice(&l1_fee.0.to_le_bytes());
        out
    }

    pub fn is_authentic(&self) -> bool {
        let payload = Self::payload(&self.recipient, self.amount, self.l1_fee);
        MessageId::derive(L2_TO_L1_DOMAIN, self.nonce, &payload) == self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaState {
    /// transfer into the pool applied, shielding pending
    FundsReceived,
    /// every call applied
    Shielded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SagaRecord {
    state: SagaState,
    /// first call not yet applied
    next_call: usize,
}

/// result of executing an inbound message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Execution {
    /// calls applied by this execution, with the pool receipts
    Applied(Vec<TransactReceipt>),
    /// message was already fully applied
    Replayed,
}

/// result of delivering an outbound message on l1
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Duplicate,
}

/// l2 side of the bridge
#[derive(Clone, Debug)]
pub struct BridgeRelay {
    account: AccountId,
    sagas: HashMap<MessageId, SagaRecord>,
    /// outbox entries already delivered to l1
    relayed: usize,
}

impl BridgeRelay {
    pub fn new(account: AccountId) -> Self {
        Self {
            account,
            sagas: HashMap::new(),
            relayed: 0,
        }
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    /// `None` until the first call of the message is applied
    pub fn state(&self, id: &MessageId) -> Option<SagaState> {
        self.sagas.get(id).map(|r| r.state)
    }

    /// apply an inbound message, resuming after the last applied call
    pub fn execute<L: Ledger>(
        &mut self,
        pool: &Pool,
        state: &mut PoolState,
        ledger: &mut L,
        message: &InboundMessage,
    ) -> Result<Execution, BridgeError> {
        if !message.is_authentic() {
            return Err(BridgeError::InvalidMessageId(message.id));
        }
        let mut record = match self.sagas.get(&message.id) {
            Some(record) if record.state == SagaState::Shielded => {
                warn!("bridge message {} replayed after completion, ignoring", message.id);
                return Ok(Execution::Replayed);
            }
            Some(record) => {
                warn!(
                    "resuming bridge message {} at call {}",
                    message.id, record.next_call
                );
                *record
            }
            None => SagaRecord {
                state: SagaState::FundsReceived,
                next_call: 0,
            },
        };

        let mut receipts = Vec::new();
        for (index, call) in message.calls.iter().enumerate().skip(record.next_call) {
            let result = match call {
                BridgeCall::Transfer { to, amount } => ledger
                    .transfer(&self.account, to, *amount)
                    .map_err(|source| BridgeError::Transfer { index, source }),
                BridgeCall::TokenBridged {
                    token,
                    amount,
                    payload,
                } => pool
                    .on_token_bridged(state, ledger, &self.account, token, *amount, payload)
                    .map(|receipt| receipts.push(receipt))
                    .map_err(|source| BridgeError::Shield { index, source }),
            };
            if let Err(e) = result {
                if record.next_call > 0 {
                    self.sagas.insert(message.id, record);
                }
                warn!("bridge message {} stopped at call {}: {}", message.id, index, e);
                return Err(e);
            }
            record.next_call = index + 1;
            if record.next_call == 1 {
                info!("bridge message {}: funds received", message.id);
            }
        }

        record.state = SagaState::Shielded;
        self.sagas.insert(message.id, record);
        info!("bridge message {}: shielded", message.id);
        Ok(Execution::Applied(receipts))
    }

    /// withdrawals queued since the last successful relay. redelivering
    /// them is safe
    pub fn collect_outbound<'a>(&self, state: &'a PoolState) -> &'a [OutboundMessage] {
        state.outbox().get(self.relayed..).unwrap_or(&[])
    }

    /// deliver pending withdrawals, stopping at the first failure
    pub fn relay_to_l1<L: Ledger>(
        &mut self,
        state: &PoolState,
        gateway: &mut L1Gateway,
        l1: &mut L,
        relayer: &AccountId,
    ) -> Result<Vec<(MessageId, Delivery)>, BridgeError> {
        let mut delivered = Vec::new();
        for message in self.collect_outbound(state) {
            let outcome = gateway.deliver(l1, message, relayer)?;
            delivered.push((message.id, outcome));
            self.relayed += 1;
        }
        Ok(delivered)
    }
}

/// l1 side of the bridge: locks deposits, pays out withdrawals
#[derive(Clone, Debug)]
pub struct L1Gateway {
    escrow: AccountId,
    delivered: HashSet<MessageId>,
    deposit_nonce: u64,
}

impl L1Gateway {
    pub fn new(escrow: AccountId) -> Self {
        Self {
            escrow,
            delivered: HashSet::new(),
            deposit_nonce: 0,
        }
    }

    pub fn escrow(&self) -> AccountId {
        self.escrow
    }

    pub fn is_delivered(&self, id: &MessageId) -> bool {
        self.delivered.contains(id)
    }

    /// lock `amount` from `sender` and build the l2 deposit message
    pub fn relay_deposit<L: Ledger>(
        &mut self,
        l1: &mut L,
        sender: &AccountId,
        pool_account: AccountId,
        l2_token: AccountId,
        amount: Amount,
        args: &TransactArgs,
    ) -> Result<InboundMessage, BridgeError> {
        let message =
            InboundMessage::deposit(self.deposit_nonce, pool_account, l2_token, amount, args)?;
        l1.transfer(sender, &self.escrow, amount)?;
        self.deposit_nonce += 1;
        info!("locked {} on l1 for message {}", amount, message.id);
        Ok(message)
    }

    /// apply a withdrawal once: `amount - l1_fee` to the recipient and
    /// `l1_fee` to the relayer
    pub fn deliver<L: Ledger>(
        &mut self,
        l1: &mut L,
        message: &OutboundMessage,
        relayer: &AccountId,
    ) -> Result<Delivery, BridgeError> {
        if !message.is_authentic() {
            return Err(BridgeError::InvalidMessageId(message.id));
        }
        if self.delivered.contains(&message.id) {
            warn!("withdrawal {} already delivered", message.id);
            return Ok(Delivery::Duplicate);
        }
        let payout = message
            .amount
            .checked_sub(message.l1_fee)
            .ok_or(BridgeError::InvalidFee)?;
        let available = l1.balance_of(&self.escrow);
        if available < message.amount {
            return Err(LedgerError::InsufficientBalance {
                account: self.escrow,
                available,
                required: message.amount,
            }
            .into());
        }
        check_credit(l1, &message.recipient, payout, relayer, message.l1_fee)?;

        l1.transfer(&self.escrow, &message.recipient, payout)?;
        if !message.l1_fee.is_zero() {
            if let Err(e) = l1.transfer(&self.escrow, relayer, message.l1_fee) {
                // an undelivered id leaves no payout behind
                if let Err(undo) = l1.transfer(&message.recipient, &self.escrow, payout) {
                    warn!("failed to unwind payout of withdrawal {}: {}", message.id, undo);
                }
                return Err(e.into());
            }
        }
        self.delivered.insert(message.id);
        info!(
            "delivered withdrawal {}: {} to {}",
            message.id, payout, message.recipient
        );
        Ok(Delivery::Delivered)
    }
}

/// both credits of a delivery fit, including when recipient and relayer
/// are the same account
fn check_credit<L: Ledger>(
    l1: &L,
    recipient: &AccountId,
    payout: Amount,
    relayer: &AccountId,
    l1_fee: Amount,
) -> Result<(), LedgerError> {
    let recipient_total = if recipient == relayer {
        payout.checked_add(l1_fee)
    } else {
        Some(payout)
    };
    let fits = |account: &AccountId, amount: Option<Amount>| {
        amount
            .and_then(|a| l1.balance_of(account).checked_add(a))
            .map(|_| ())
            .ok_or(LedgerError::Overflow(*account))
    };
    fits(recipient, recipient_total)?;
    fits(relayer, Some(l1_fee))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("message id does not match contents: {0}")]
    InvalidMessageId(MessageId),
    #[error("call {index}: transfer failed: {source}")]
    Transfer {
        index: usize,
        #[source]
        source: LedgerError,
    },
    #[error("call {index}: shielding failed: {source}")]
    Shield {
        index: usize,
        #[source]
        source: PoolError,
    },
    #[error("l1 fee exceeds withdrawal amount")]
    InvalidFee,
    #[error("failed to encode payload: {0}")]
    Encode(PoolError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    #[test]
    fn test_message_ids() {
        let a = OutboundMessage::new(0, AccountId::derive("r"), Amount(10), Amount(1));
        let b = OutboundMessage::new(1, AccountId::derive("r"), Amount(10), Amount(1));
        assert_ne!(a.id, b.id);
        assert!(a.is_authentic());

        let mut forged = a.clone();
        forged.amount = Amount(1000);
        assert!(!forged.is_authentic());
    }

    #[test]
    fn test_deliver_is_idempotent() {
        let escrow = AccountId::derive("escrow");
        let recipient = AccountId::derive("recipient");
        let relayer = AccountId::derive("relayer");
        let mut l1 = InMemoryLedger::new(AccountId::derive("l1 token"));
        l1.mint(&escrow, Amount(100)).unwrap();

        let mut gateway = L1Gateway::new(escrow);
        let message = OutboundMessage::new(0, recipient, Amount(70), Amount(5));

        assert_eq!(gateway.deliver(&mut l1, &message, &relayer), Ok(Delivery::Delivered));
        assert_eq!(gateway.deliver(&mut l1, &message, &relayer), Ok(Delivery::Duplicate));
        assert!(gateway.is_delivered(&message.id));
        assert_eq!(l1.balance_of(&recipient), Amount(65));
        assert_eq!(l1.balance_of(&relayer), Amount(5));
        assert_eq!(l1.balance_of(&escrow), Amount(30));
    }

    #[test]
    fn test_deliver_insufficient_escrow() {
        let escrow = AccountId::derive("escrow");
        let mut l1 = InMemoryLedger::new(AccountId::derive("l1 token"));
        l1.mint(&escrow, Amount(10)).unwrap();
        let mut gateway = L1Gateway::new(escrow);
        let message = OutboundMessage::new(0, AccountId::derive("r"), Amount(70), Amount::ZERO);

        assert!(matches!(
            gateway.deliver(&mut l1, &message, &AccountId::derive("relayer")),
            Err(BridgeError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
        assert!(!gateway.is_delivered(&message.id));
        assert_eq!(l1.balance_of(&escrow), Amount(10));
    }

    /// in-memory ledger that rejects one chosen transfer
    struct FailingLedger {
        inner: InMemoryLedger,
        transfers: usize,
        fail_at: Option<usize>,
    }

    impl Ledger for FailingLedger {
        fn token(&self) -> AccountId {
            self.inner.token()
        }

        fn balance_of(&self, account: &AccountId) -> Amount {
            self.inner.balance_of(account)
        }

        fn transfer(
            &mut self,
            from: &AccountId,
            to: &AccountId,
            amount: Amount,
        ) -> Result<(), LedgerError> {
            let n = self.transfers;
            self.transfers += 1;
            if self.fail_at == Some(n) {
                self.fail_at = None;
                return Err(LedgerError::Overflow(*to));
            }
            self.inner.transfer(from, to, amount)
        }
    }

    #[test]
    fn test_failed_fee_transfer_pays_once() {
        let escrow = AccountId::derive("escrow");
        let recipient = AccountId::derive("recipient");
        let relayer = AccountId::derive("relayer");
        let mut inner = InMemoryLedger::new(AccountId::derive("l1 token"));
        inner.mint(&escrow, Amount(100)).unwrap();
        // second transfer of the first delivery is the fee
        let mut l1 = FailingLedger {
            inner,
            transfers: 0,
            fail_at: Some(1),
        };

        let mut gateway = L1Gateway::new(escrow);
        let message = OutboundMessage::new(0, recipient, Amount(70), Amount(5));

        assert!(matches!(
            gateway.deliver(&mut l1, &message, &relayer),
            Err(BridgeError::Ledger(LedgerError::Overflow(_)))
        ));
        assert!(!gateway.is_delivered(&message.id));
        assert_eq!(l1.balance_of(&recipient), Amount::ZERO);
        assert_eq!(l1.balance_of(&escrow), Amount(100));

        assert_eq!(gateway.deliver(&mut l1, &message, &relayer), Ok(Delivery::Delivered));
        assert_eq!(gateway.deliver(&mut l1, &message, &relayer), Ok(Delivery::Duplicate));
        assert_eq!(l1.balance_of(&recipient), Amount(65));
        assert_eq!(l1.balance_of(&relayer), Amount(5));
        assert_eq!(l1.balance_of(&escrow), Amount(30));
    }

    #[test]
    fn test_relayer_overflow_rejected_before_payout() {
        let escrow = AccountId::derive("escrow");
        let recipient = AccountId::derive("recipient");
        let relayer = AccountId::derive("relayer");
        let mut l1 = InMemoryLedger::new(AccountId::derive("l1 token"));
        l1.mint(&escrow, Amount(100)).unwrap();
        l1.mint(&relayer, Amount(u128::MAX)).unwrap();

        let mut gateway = L1Gateway::new(escrow);
        let message = OutboundMessage::new(0, recipient, Amount(70), Amount(1));

        assert_eq!(
            gateway.deliver(&mut l1, &message, &relayer),
            Err(BridgeError::Ledger(LedgerError::Overflow(relayer)))
        );
        assert_eq!(
            gateway.deliver(&mut l1, &message, &relayer),
            Err(BridgeError::Ledger(LedgerError::Overflow(relayer)))
        );
        assert!(!gateway.is_delivered(&message.id));
        assert_eq!(l1.balance_of(&recipient), Amount::ZERO);
        assert_eq!(l1.balance_of(&escrow), Amount(100));
    }
}
