//! shared fixture: l1 + l2 ledgers, pool, bridge relay and l1 gateway

#![allow(dead_code)]

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use umbra_pool::client::tree_from_events;
use umbra_pool::proof::dev::{self, DevProver};
use umbra_pool::value::UNIT;
use umbra_pool::{
    prepare_transaction, AccountId, Amount, BridgeRelay, Execution, InMemoryLedger, L1Gateway,
    Ledger, Pool, PoolConfig, PoolState, TransactArgs, TransactReceipt, TransactionRequest,
};

pub const MERKLE_TREE_HEIGHT: usize = 5;

pub fn units(s: &str) -> Amount {
    Amount::parse_units(s).unwrap()
}

pub fn account(hex: &str) -> AccountId {
    hex.parse().unwrap()
}

pub struct Env {
    pub config: PoolConfig,
    pub pool: Pool,
    pub state: PoolState,
    pub l1: InMemoryLedger,
    pub l2: InMemoryLedger,
    pub relay: BridgeRelay,
    pub gateway: L1Gateway,
    pub prover: DevProver,
    pub rng: ChaCha20Rng,
    /// funded l1 account
    pub sender: AccountId,
}

impl Env {
    pub fn new() -> Self {
        Self::with_config(PoolConfig {
            tree_height: MERKLE_TREE_HEIGHT,
            ..Default::default()
        })
    }

    pub fn with_config(config: PoolConfig) -> Self {
        let (prover, v2, v16) = dev::setup(b"umbra integration");
        let pool = Pool::new(config.clone(), v2, v16).unwrap();
        let state = pool.genesis().unwrap();

        let sender = AccountId::derive("sender");
        let mut l1 = InMemoryLedger::new(AccountId::derive("l1 weth"));
        l1.mint(&sender, Amount(10_000 * UNIT)).unwrap();
        let l2 = InMemoryLedger::new(config.token);

        Self {
            relay: BridgeRelay::new(config.bridge_account),
            gateway: L1Gateway::new(config.l1_unwrapper),
            config,
            pool,
            state,
            l1,
            l2,
            prover,
            rng: ChaCha20Rng::seed_from_u64(1337),
            sender,
        }
    }

    /// build a transaction against the tree rebuilt from the event log
    pub fn prepare(&mut self, request: TransactionRequest) -> TransactArgs {
        let tree = tree_from_events(&self.config, self.state.events()).unwrap();
        assert_eq!(tree.root(), self.state.root());
        prepare_transaction(&tree, request, &self.prover, &mut self.rng).unwrap()
    }

    /// lock on l1, mint the bridged tokens to the l2 bridge account and
    /// execute the resulting message
    pub fn bridge_deposit(&mut self, amount: Amount, args: &TransactArgs) -> Vec<TransactReceipt> {
        let message = self
            .gateway
            .relay_deposit(
                &mut self.l1,
                &self.sender,
                self.config.pool_account,
                self.config.token,
                amount,
                args,
            )
            .unwrap();
        self.l2.mint(&self.config.bridge_account, amount).unwrap();
        match self
            .relay
            .execute(&self.pool, &mut self.state, &mut self.l2, &message)
            .unwrap()
        {
            Execution::Applied(receipts) => receipts,
            Execution::Replayed => panic!("fresh message reported as replayed"),
        }
    }

    pub fn transact(&mut self, args: &TransactArgs) -> TransactReceipt {
        let relayer = AccountId::derive("relayer");
        self.pool
            .transact(&mut self.state, &mut self.l2, &relayer, args)
            .unwrap()
    }

    pub fn l2_balance(&self, account: &AccountId) -> Amount {
        self.l2.balance_of(account)
    }

    pub fn pool_balance(&self) -> Amount {
        self.l2.balance_of(&self.config.pool_account)
    }

    pub fn bridge_balance(&self) -> Amount {
        self.l2.balance_of(&self.config.bridge_account)
    }
}
