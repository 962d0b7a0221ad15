//! external token ledger
//!
//! the pool only ever needs `balance_of` and `transfer` on the single
//! token it shields. [`InMemoryLedger`] backs tests and the cli; a chain
//! runtime would implement [`Ledger`] over its own balances.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::value::Amount;

/// 20-byte account identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    pub const ZERO: Self = Self([0u8; 20]);

    /// deterministic account from a label ("pool", "bridge", ...)
    pub fn derive(label: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"umbra.account.v1");
        hasher.update(label.as_bytes());
        let mut id = [0u8; 20];
        id.copy_from_slice(&hasher.finalize().as_bytes()[..20]);
        Self(id)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid account id: {0}")]
pub struct AccountParseError(String);

impl FromStr for AccountId {
    type Err = AccountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| AccountParseError(e.to_string()))?;
        let id: [u8; 20] = bytes.try_into().map_err(|b: Vec<u8>| {
            AccountParseError(format!("expected 20 bytes, got {}", b.len()))
        })?;
        Ok(Self(id))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; 20]>::deserialize(deserializer).map(Self)
        }
    }
}

/// balances of one fungible token
pub trait Ledger {
    /// token this ledger accounts for
    fn token(&self) -> AccountId;

    fn balance_of(&self, account: &AccountId) -> Amount;

    /// move `amount` from `from` to `to`. fails without side effects
    fn transfer(&mut self, from: &AccountId, to: &AccountId, amount: Amount)
        -> Result<(), LedgerError>;
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance: {account} has {available}, needs {required}")]
    InsufficientBalance {
        account: AccountId,
        available: Amount,
        required: Amount,
    },
    #[error("balance overflow for {0}")]
    Overflow(AccountId),
}

/// hashmap-backed ledger
#[derive(Clone, Debug)]
pub struct InMemoryLedger {
    token: AccountId,
    balances: HashMap<AccountId, Amount>,
}

impl InMemoryLedger {
    pub fn new(token: AccountId) -> Self {
        Self {
            token,
            balances: HashMap::new(),
        }
    }

    /// create new supply
    pub fn mint(&mut self, account: &AccountId, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(account);
        let updated = balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(*account))?;
        self.balances.insert(*account, updated);
        Ok(())
    }

    pub fn total_supply(&self) -> Amount {
        self.balances
            .values()
            .fold(Amount::ZERO, |acc, b| acc.saturating_add(*b))
    }
}

impl Ledger for InMemoryLedger {
    fn token(&self) -> AccountId {
        self.token
    }

    fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let available = self.balance_of(from);
        let debited = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account: *from,
                available,
                required: amount,
            })?;
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(*to))?;
        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        Ok(())
    }
}
