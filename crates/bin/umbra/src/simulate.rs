//! bridge scenarios against in-memory ledgers

use anyhow::{bail, Context, Result};
use rand::rngs::ThreadRng;
use serde::Serialize;
use umbra_pool::client::tree_from_events;
use umbra_pool::proof::dev::{self, DevProver};
use umbra_pool::{
    prepare_transaction, AccountId, Amount, BridgeRelay, Execution, InMemoryLedger, Keypair,
    L1Gateway, Ledger, Note, Pool, PoolConfig, PoolState, Scanner, TransactArgs,
    TransactionRequest,
};

#[derive(Debug, Serialize)]
pub struct Report {
    pub scenario: &'static str,
    pub root: String,
    pub leaves: u64,
    pub balances: Vec<Balance>,
}

#[derive(Debug, Serialize)]
pub struct Balance {
    pub layer: &'static str,
    pub label: String,
    pub account: AccountId,
    pub amount: Amount,
}

struct Sim {
    config: PoolConfig,
    pool: Pool,
    state: PoolState,
    l1: InMemoryLedger,
    l2: InMemoryLedger,
    relay: BridgeRelay,
    gateway: L1Gateway,
    prover: DevProver,
    rng: ThreadRng,
    sender: AccountId,
    relayer: AccountId,
}

impl Sim {
    fn new(config: &PoolConfig) -> Result<Self> {
        let (prover, v2, v16) = dev::setup(b"umbra simulate");
        let pool = Pool::new(config.clone(), v2, v16)?;
        let state = pool.genesis()?;

        let sender = AccountId::derive("sender");
        let mut l1 = InMemoryLedger::new(AccountId::derive("l1 weth"));
        l1.mint(&sender, Amount::parse_units("10000")?)?;

        Ok(Self {
            config: config.clone(),
            pool,
            state,
            l1,
            l2: InMemoryLedger::new(config.token),
            relay: BridgeRelay::new(config.bridge_account),
            gateway: L1Gateway::new(config.l1_unwrapper),
            prover,
            rng: rand::thread_rng(),
            sender,
            relayer: AccountId::derive("relayer"),
        })
    }

    fn prepare(&mut self, request: TransactionRequest) -> Result<TransactArgs> {
        let tree = tree_from_events(&self.config, self.state.events())?;
        Ok(prepare_transaction(&tree, request, &self.prover, &mut self.rng)?)
    }

    fn bridge_deposit(&mut self, amount: Amount, note: &Note) -> Result<()> {
        let args = self.prepare(TransactionRequest {
            outputs: vec![note.clone()],
            ..Default::default()
        })?;
        let message = self.gateway.relay_deposit(
            &mut self.l1,
            &self.sender,
            self.config.pool_account,
            self.config.token,
            amount,
            &args,
        )?;
        self.l2.mint(&self.config.bridge_account, amount)?;
        match self
            .relay
            .execute(&self.pool, &mut self.state, &mut self.l2, &message)?
        {
            Execution::Applied(_) => Ok(()),
            Execution::Replayed => bail!("deposit message {} was already applied", message.id),
        }
    }

    fn transact(&mut self, request: TransactionRequest) -> Result<()> {
        let args = self.prepare(request)?;
        self.pool
            .transact(&mut self.state, &mut self.l2, &self.relayer, &args)
            .context("transaction rejected")?;
        Ok(())
    }

    fn report(&self, scenario: &'static str, watch: &[(&'static str, &str, AccountId)]) -> Report {
        let mut balances = vec![
            self.balance("l2", "pool", self.config.pool_account),
            self.balance("l2", "bridge", self.config.bridge_account),
            self.balance("l1", "unwrapper", self.config.l1_unwrapper),
        ];
        for &(layer, label, account) in watch {
            balances.push(self.balance(layer, label, account));
        }
        Report {
            scenario,
            root: self.state.root().0.to_hex(),
            leaves: self.state.tree().len(),
            balances,
        }
    }

    fn balance(&self, layer: &'static str, label: &str, account: AccountId) -> Balance {
        let ledger = if layer == "l1" { &self.l1 } else { &self.l2 };
        Balance {
            layer,
            label: label.to_string(),
            account,
            amount: ledger.balance_of(&account),
        }
    }
}

/// deposit 0.1 via the bridge, withdraw 0.08 to an l2 recipient
pub fn deposit_withdraw(config: &PoolConfig) -> Result<Report> {
    let mut sim = Sim::new(config)?;
    let alice = Keypair::random(&mut sim.rng);

    let deposit_amount = Amount::parse_units("0.1")?;
    let deposit = Note::new(deposit_amount, alice.clone(), &mut sim.rng);
    sim.bridge_deposit(deposit_amount, &deposit)?;

    let recipient: AccountId = "0x0000000000000000000000000000000000000001".parse()?;
    let change = Note::new(Amount::parse_units("0.02")?, alice, &mut sim.rng);
    sim.transact(TransactionRequest {
        inputs: vec![deposit],
        outputs: vec![change],
        recipient,
        ..Default::default()
    })?;

    Ok(sim.report("deposit-withdraw", &[("l2", "recipient", recipient)]))
}

/// deposit 0.13, pay 0.06 to bob, bob withdraws on l2, alice withdraws
/// the remaining 0.07 to l1 and the withdrawal is relayed
pub fn split_l1(config: &PoolConfig) -> Result<Report> {
    let mut sim = Sim::new(config)?;
    let alice = Keypair::random(&mut sim.rng);
    let bob = Keypair::random(&mut sim.rng);

    let deposit_amount = Amount::parse_units("0.13")?;
    let deposit = Note::new(deposit_amount, alice.clone(), &mut sim.rng);
    sim.bridge_deposit(deposit_amount, &deposit)?;

    let to_bob = Note::new(
        Amount::parse_units("0.06")?,
        Keypair::from_string(&bob.address())?,
        &mut sim.rng,
    );
    let alice_change = Note::new(Amount::parse_units("0.07")?, alice, &mut sim.rng);
    sim.transact(TransactionRequest {
        inputs: vec![deposit],
        outputs: vec![to_bob, alice_change.clone()],
        ..Default::default()
    })?;

    let bob_notes = Scanner::new(bob).scan(sim.state.events(), sim.state.nullifiers());
    let Some(bob_note) = bob_notes.into_iter().next() else {
        bail!("bob's note not found in the event log");
    };
    let bob_recipient: AccountId = "0x0000000000000000000000000000000000000001".parse()?;
    sim.transact(TransactionRequest {
        inputs: vec![bob_note.note],
        recipient: bob_recipient,
        ..Default::default()
    })?;

    let alice_recipient: AccountId = "0x1234560000000000000000000000000000000002".parse()?;
    sim.transact(TransactionRequest {
        inputs: vec![alice_change],
        recipient: alice_recipient,
        is_l1_withdrawal: true,
        ..Default::default()
    })?;

    let l1_relayer = AccountId::derive("l1 relayer");
    let delivered = sim
        .relay
        .relay_to_l1(&sim.state, &mut sim.gateway, &mut sim.l1, &l1_relayer)?;
    tracing::info!("relayed {} withdrawals to l1", delivered.len());

    Ok(sim.report(
        "split-l1",
        &[
            ("l2", "bob recipient", bob_recipient),
            ("l2", "alice recipient", alice_recipient),
            ("l1", "alice recipient", alice_recipient),
        ],
    ))
}
