//! public transaction data bound into the proof
//!
//! everything a transaction does outside the shielded set (who gets paid,
//! the relayer fee, the encrypted outputs) lives here. its hash is a
//! public signal, so a relayer cannot change any of it after proving.

use serde::{Deserialize, Serialize};

use crate::field::FieldElement;
use crate::hash;
use crate::ledger::AccountId;
use crate::value::Amount;

const EXT_DATA_DOMAIN: &[u8] = b"umbra.ext-data.v1";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtData {
    /// withdrawal recipient (l1 recipient for l1 withdrawals)
    pub recipient: AccountId,
    /// signed public amount: >0 deposit, <0 withdrawal
    pub ext_amount: i128,
    pub relayer: AccountId,
    pub fee: Amount,
    pub encrypted_output1: Vec<u8>,
    pub encrypted_output2: Vec<u8>,
    pub is_l1_withdrawal: bool,
    /// paid on l1 to whoever delivers the withdrawal
    pub l1_fee: Amount,
}

impl ExtData {
    pub fn hash(&self) -> FieldElement {
        hash::hash_bytes(EXT_DATA_DOMAIN, &self.encode())
    }

    /// canonical encoding, length-prefixed where variable
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            20 + 16 + 20 + 16 + 8 + self.encrypted_output1.len() + 8
                + self.encrypted_output2.len() + 1 + 16,
        );
        out.extend_from_slice(&self.recipient.0);
        out.extend_from_slice(&self.ext_amount.to_le_bytes());
        out.extend_from_slice(&self.relayer.0);
        out.extend_from_slice(&self.fee.0.to_le_bytes());
        for output in [&self.encrypted_output1, &self.encrypted_output2] {
            out.extend_from_slice(&(output.len() as u64).to_le_bytes());
            out.extend_from_slice(output);
        }
        out.push(self.is_l1_withdrawal as u8);
        out.extend_from_slice(&self.l1_fee.0.to_le_bytes());
        out
    }

    pub fn is_deposit(&self) -> bool {
        self.ext_amount > 0
    }

    pub fn is_withdrawal(&self) -> bool {
        self.ext_amount < 0
    }

    /// amount leaving the pool, zero for deposits and transfers
    pub fn withdrawal_amount(&self) -> Amount {
        if self.ext_amount < 0 {
            Amount(self.ext_amount.unsigned_abs())
        } else {
            Amount::ZERO
        }
    }

    /// amount entering the pool, zero for withdrawals and transfers
    pub fn deposit_amount(&self) -> Amount {
        if self.ext_amount > 0 {
            Amount(self.ext_amount as u128)
        } else {
            Amount::ZERO
        }
    }

    pub fn encrypted_outputs(&self) -> [&[u8]; 2] {
        [&self.encrypted_output1, &self.encrypted_output2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtData {
        ExtData {
            recipient: AccountId::derive("bob"),
            ext_amount: -80,
            relayer: AccountId::derive("relayer"),
            fee: Amount(2),
            encrypted_output1: vec![1, 2, 3],
            encrypted_output2: vec![4, 5],
            is_l1_withdrawal: false,
            l1_fee: Amount::ZERO,
        }
    }

    #[test]
    fn test_hash_binds_every_field() {
        let base = sample();
        let h = base.hash();
        assert_eq!(h, sample().hash());

        let mut changed = sample();
        changed.fee = Amount(3);
        assert_ne!(changed.hash(), h);

        let mut changed = sample();
        changed.is_l1_withdrawal = true;
        assert_ne!(changed.hash(), h);

        // moving bytes between outputs changes the hash
        let mut changed = sample();
        changed.encrypted_output1 = vec![1, 2];
        changed.encrypted_output2 = vec![3, 4, 5];
        assert_ne!(changed.hash(), h);
    }

    #[test]
    fn test_direction() {
        let w = sample();
        assert!(w.is_withdrawal());
        assert_eq!(w.withdrawal_amount(), Amount(80));
        assert_eq!(w.deposit_amount(), Amount::ZERO);

        let d = ExtData { ext_amount: 100, ..sample() };
        assert!(d.is_deposit());
        assert_eq!(d.deposit_amount(), Amount(100));
    }
}
