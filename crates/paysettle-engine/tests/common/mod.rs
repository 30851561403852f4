//! In-memory collaborators and a wired-up settler for integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use paysettle_engine::{
    AddressProvider, ChainClient, ChannelProvider, Collaborators, Ed25519Keystore, HermesCaller,
    HermesCallerFactory, HermesPromiseSettler, HermesUrlResolver, PaySettler, PromiseStorage,
    RegistrationStatusProvider, SettledEventSubscription, SettlementHistoryStorage, Transactor,
};
use paysettle_types::{
    Address, ChainId, Channel, ChannelId, ExchangeMessage, Identity, PaysettleError, Promise,
    PromiseSettledEvent, RegistrationStatus, Result, SettleFees, SettlementHistoryEntry,
    SettlerConfig, StoredPromise, TxHash, constants,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

pub const CHAIN: ChainId = ChainId(1);
pub const L1_CHAIN: ChainId = ChainId(5);
pub const HERMES: Address = Address([0x4e; 20]);
pub const ACTIVE_HERMES: Address = Address([0x4a; 20]);
pub const CONSUMER_CHANNEL: Address = Address([0xcc; 20]);
pub const TOKEN: Address = Address([0x70; 20]);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn tokens(n: i64) -> Decimal {
    Decimal::from(constants::ONE_TOKEN) * Decimal::from(n)
}

pub fn test_config() -> SettlerConfig {
    SettlerConfig {
        threshold: 0.5,
        max_wait_for_settlement: Duration::from_millis(300),
        chain_id: CHAIN,
        l1_chain_id: L1_CHAIN,
        l2_chain_id: CHAIN,
        settle_queue_capacity: 5,
    }
}

/// Poll `cond` every 10ms for up to two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct MockRegistry {
    pub status: Mutex<RegistrationStatus>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl RegistrationStatusProvider for MockRegistry {
    async fn registration_status(&self, _: ChainId, _: &Identity) -> Result<RegistrationStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock())
    }
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockChannels {
    channels: Mutex<HashMap<(Identity, Address), Channel>>,
    /// When set, `get` misses and only `fetch` finds channels.
    pub cache_cold: AtomicBool,
    pub fetches: AtomicUsize,
}

impl MockChannels {
    pub fn insert(&self, channel: Channel) {
        self.channels
            .lock()
            .insert((channel.identity, channel.hermes_id), channel);
    }

    pub fn remove(&self, id: &Identity, hermes_id: &Address) {
        self.channels.lock().remove(&(*id, *hermes_id));
    }

    fn mark_settled(&self, id: &Identity, hermes_id: &Address, amount: Decimal) {
        if let Some(channel) = self.channels.lock().get_mut(&(*id, *hermes_id)) {
            channel.settled = amount;
        }
    }
}

#[async_trait]
impl ChannelProvider for MockChannels {
    fn get(&self, _: ChainId, id: &Identity, hermes_id: &Address) -> Option<Channel> {
        if self.cache_cold.load(Ordering::SeqCst) {
            return None;
        }
        self.channels.lock().get(&(*id, *hermes_id)).cloned()
    }

    async fn fetch(&self, _: ChainId, id: &Identity, hermes_id: &Address) -> Result<Channel> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.channels
            .lock()
            .get(&(*id, *hermes_id))
            .cloned()
            .ok_or(PaysettleError::ChannelNotFound {
                identity: *id,
                hermes_id: *hermes_id,
            })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

pub struct MockChain {
    pub hermes_fee: Mutex<Decimal>,
    pub hermes_fee_rate: AtomicU16,
    /// Values passed to `calculate_hermes_fee`.
    pub fee_inputs: Mutex<Vec<Decimal>>,
    pub token_balance: Mutex<Decimal>,
    pub fail_subscribe: AtomicBool,
    /// Emit a confirmation as soon as a settlement is submitted.
    pub auto_confirm: AtomicBool,
    pub subscriptions: AtomicUsize,
    pub cancellations: Arc<AtomicUsize>,
    sinks: Mutex<Vec<mpsc::Sender<PromiseSettledEvent>>>,
}

impl MockChain {
    fn new() -> Self {
        Self {
            hermes_fee: Mutex::new(Decimal::from(50)),
            hermes_fee_rate: AtomicU16::new(250),
            fee_inputs: Mutex::new(Vec::new()),
            token_balance: Mutex::new(Decimal::ZERO),
            fail_subscribe: AtomicBool::new(false),
            auto_confirm: AtomicBool::new(true),
            subscriptions: AtomicUsize::new(0),
            cancellations: Arc::new(AtomicUsize::new(0)),
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Deliver `event` to every open subscription.
    pub fn emit(&self, event: &PromiseSettledEvent) {
        for sink in self.sinks.lock().iter() {
            let _ = sink.try_send(event.clone());
        }
    }

    /// Drop every sender, as a node losing its event stream would.
    pub fn close_sinks(&self) {
        self.sinks.lock().clear();
    }

    pub fn cancelled(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    fn confirm(&self, promise: &Promise, beneficiary: Address) {
        if self.auto_confirm.load(Ordering::SeqCst) {
            self.emit(&settled_event(promise, beneficiary));
        }
    }
}

pub fn settled_event(promise: &Promise, beneficiary: Address) -> PromiseSettledEvent {
    PromiseSettledEvent {
        tx_hash: TxHash([0x7a; 32]),
        channel_id: promise.channel_id,
        beneficiary,
        amount_sent_to_beneficiary: promise.amount - promise.fee,
        fees: promise.fee,
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn subscribe_to_promise_settled(
        &self,
        _: ChainId,
        _: &Identity,
        _: &Address,
    ) -> Result<SettledEventSubscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(PaysettleError::Upstream("node unreachable".into()));
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(1);
        self.sinks.lock().push(tx);
        let cancellations = Arc::clone(&self.cancellations);
        Ok(SettledEventSubscription::new(rx, move || {
            cancellations.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn hermes_fee(&self, _: ChainId, _: &Address) -> Result<u16> {
        Ok(self.hermes_fee_rate.load(Ordering::SeqCst))
    }

    async fn calculate_hermes_fee(&self, _: ChainId, _: &Address, value: Decimal) -> Result<Decimal> {
        self.fee_inputs.lock().push(value);
        Ok(*self.hermes_fee.lock())
    }

    async fn token_balance(&self, _: ChainId, token: &Address, holder: &Address) -> Result<Decimal> {
        if *token != TOKEN || *holder != CONSUMER_CHANNEL {
            return Err(PaysettleError::Upstream("unexpected balance query".into()));
        }
        Ok(*self.token_balance.lock())
    }
}

// ---------------------------------------------------------------------------
// Transactor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Submitted {
    pub kind: &'static str,
    pub provider: Identity,
    pub hermes_id: Address,
    pub promise: Promise,
    pub beneficiary: Option<Address>,
    pub signature: Option<String>,
}

pub struct MockTransactor {
    pub quoted_fee: Mutex<Decimal>,
    pub fail_fee_quote: AtomicBool,
    pub fail_submit: AtomicBool,
    pub submissions: Mutex<Vec<Submitted>>,
    chain: Arc<MockChain>,
    channels: Arc<MockChannels>,
}

impl MockTransactor {
    fn new(chain: Arc<MockChain>, channels: Arc<MockChannels>) -> Self {
        Self {
            quoted_fee: Mutex::new(Decimal::from(10)),
            fail_fee_quote: AtomicBool::new(false),
            fail_submit: AtomicBool::new(false),
            submissions: Mutex::new(Vec::new()),
            chain,
            channels,
        }
    }

    pub fn count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn last(&self) -> Option<Submitted> {
        self.submissions.lock().last().cloned()
    }

    fn submit(&self, submitted: Submitted) -> Result<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(PaysettleError::Upstream("transaction rejected".into()));
        }
        self.channels.mark_settled(
            &submitted.provider,
            &submitted.hermes_id,
            submitted.promise.amount,
        );
        self.chain.confirm(
            &submitted.promise,
            submitted.beneficiary.unwrap_or(Address::ZERO),
        );
        self.submissions.lock().push(submitted);
        Ok(())
    }
}

#[async_trait]
impl Transactor for MockTransactor {
    async fn settle_and_rebalance(&self, hermes_id: &Address, provider_id: &Identity, promise: &Promise) -> Result<()> {
        self.submit(Submitted {
            kind: "rebalance",
            provider: *provider_id,
            hermes_id: *hermes_id,
            promise: promise.clone(),
            beneficiary: None,
            signature: None,
        })
    }

    async fn settle_with_beneficiary(
        &self,
        provider_id: &Identity,
        beneficiary: &Address,
        hermes_id: &Address,
        promise: &Promise,
    ) -> Result<()> {
        self.submit(Submitted {
            kind: "beneficiary",
            provider: *provider_id,
            hermes_id: *hermes_id,
            promise: promise.clone(),
            beneficiary: Some(*beneficiary),
            signature: None,
        })
    }

    async fn pay_and_settle(
        &self,
        hermes_id: &Address,
        provider_id: &Identity,
        promise: &Promise,
        beneficiary: &Address,
        beneficiary_signature: &str,
    ) -> Result<()> {
        self.submit(Submitted {
            kind: "pay-and-settle",
            provider: *provider_id,
            hermes_id: *hermes_id,
            promise: promise.clone(),
            beneficiary: Some(*beneficiary),
            signature: Some(beneficiary_signature.to_string()),
        })
    }

    async fn settle_into_stake(&self, hermes_id: &Address, provider_id: &Identity, promise: &Promise) -> Result<()> {
        self.submit(Submitted {
            kind: "stake",
            provider: *provider_id,
            hermes_id: *hermes_id,
            promise: promise.clone(),
            beneficiary: None,
            signature: None,
        })
    }

    async fn fetch_settle_fees(&self, _: ChainId) -> Result<SettleFees> {
        if self.fail_fee_quote.load(Ordering::SeqCst) {
            return Err(PaysettleError::Upstream("fee oracle down".into()));
        }
        Ok(SettleFees {
            fee: *self.quoted_fee.lock(),
            valid_until: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Hermes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockHermes {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl HermesCaller for MockHermes {
    async fn update_promise_fee(&self, promise: &Promise, new_fee: Decimal) -> Result<Promise> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaysettleError::Upstream("hermes refused".into()));
        }
        let mut updated = promise.clone();
        updated.fee = new_fee;
        updated.r = Vec::new();
        updated.signature = vec![0x5e; 64];
        Ok(updated)
    }
}

pub struct MockUrlResolver;

#[async_trait]
impl HermesUrlResolver for MockUrlResolver {
    async fn hermes_url(&self, _: ChainId, _: &Address) -> Result<String> {
        Ok("http://hermes.test".into())
    }
}

// ---------------------------------------------------------------------------
// Withdrawal collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PayAndSettleCall {
    pub r: Vec<u8>,
    pub message: ExchangeMessage,
    pub provider: Identity,
    pub session_id: String,
}

#[derive(Default)]
pub struct MockPaySettler {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<PayAndSettleCall>>,
}

#[async_trait]
impl PaySettler for MockPaySettler {
    async fn pay_and_settle(
        &self,
        r: &[u8],
        message: &ExchangeMessage,
        provider_id: &Identity,
        session_id: &str,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaysettleError::Upstream("hermes pay and settle failed".into()));
        }
        self.calls.lock().push(PayAndSettleCall {
            r: r.to_vec(),
            message: message.clone(),
            provider: *provider_id,
            session_id: session_id.to_string(),
        });
        Ok(())
    }
}

pub struct MockAddresses;

#[async_trait]
impl AddressProvider for MockAddresses {
    async fn channel_address(&self, _: ChainId, _: &Identity) -> Result<Address> {
        Ok(CONSUMER_CHANNEL)
    }

    async fn active_hermes(&self, _: ChainId) -> Result<Address> {
        Ok(ACTIVE_HERMES)
    }

    async fn token_address(&self, _: ChainId) -> Result<Address> {
        Ok(TOKEN)
    }
}

#[derive(Default)]
pub struct MockPromiseStorage {
    promises: Mutex<HashMap<ChannelId, StoredPromise>>,
}

impl MockPromiseStorage {
    pub fn insert(&self, stored: StoredPromise) {
        self.promises.lock().insert(stored.channel_id, stored);
    }
}

#[async_trait]
impl PromiseStorage for MockPromiseStorage {
    async fn get(&self, _: ChainId, channel_id: &ChannelId) -> Result<StoredPromise> {
        self.promises
            .lock()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| PaysettleError::PromiseStorage(format!("no promise for {channel_id}")))
    }
}

#[derive(Default)]
pub struct MockHistory {
    pub fail: AtomicBool,
    pub entries: Mutex<Vec<SettlementHistoryEntry>>,
}

impl MockHistory {
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[async_trait]
impl SettlementHistoryStorage for MockHistory {
    async fn store(&self, entry: SettlementHistoryEntry) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaysettleError::HistoryStorage("disk full".into()));
        }
        self.entries.lock().push(entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub settler: Arc<HermesPromiseSettler>,
    pub provider: Identity,
    pub keystore: Arc<Ed25519Keystore>,
    pub registry: Arc<MockRegistry>,
    pub channels: Arc<MockChannels>,
    pub chain: Arc<MockChain>,
    pub transactor: Arc<MockTransactor>,
    pub hermes: Arc<MockHermes>,
    pub pay_settler: Arc<MockPaySettler>,
    pub promises: Arc<MockPromiseStorage>,
    pub history: Arc<MockHistory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: SettlerConfig) -> Self {
        init_tracing();

        let keystore = Arc::new(Ed25519Keystore::new());
        let provider = keystore.generate();
        let registry = Arc::new(MockRegistry {
            status: Mutex::new(RegistrationStatus::Registered),
            calls: AtomicUsize::new(0),
        });
        let channels = Arc::new(MockChannels::default());
        let chain = Arc::new(MockChain::new());
        let transactor = Arc::new(MockTransactor::new(Arc::clone(&chain), Arc::clone(&channels)));
        let hermes = Arc::new(MockHermes::default());
        let pay_settler = Arc::new(MockPaySettler::default());
        let promises = Arc::new(MockPromiseStorage::default());
        let history = Arc::new(MockHistory::default());

        let caller = Arc::clone(&hermes);
        let hermes_caller_factory: HermesCallerFactory =
            Arc::new(move |_: &str| -> Arc<dyn HermesCaller> { Arc::clone(&caller) as Arc<dyn HermesCaller> });

        let collaborators = Collaborators {
            transactor: Arc::clone(&transactor) as Arc<dyn Transactor>,
            promise_storage: Arc::clone(&promises) as Arc<dyn PromiseStorage>,
            pay_settler: Arc::clone(&pay_settler) as Arc<dyn PaySettler>,
            address_provider: Arc::new(MockAddresses),
            hermes_caller_factory,
            hermes_url_resolver: Arc::new(MockUrlResolver),
            channel_provider: Arc::clone(&channels) as Arc<dyn ChannelProvider>,
            chain: Arc::clone(&chain) as Arc<dyn ChainClient>,
            registration: Arc::clone(&registry) as Arc<dyn RegistrationStatusProvider>,
            keystore: Arc::clone(&keystore) as Arc<dyn paysettle_engine::Keystore>,
            history: Arc::clone(&history) as Arc<dyn SettlementHistoryStorage>,
        };

        let settler = Arc::new(HermesPromiseSettler::new(collaborators, config).unwrap());

        Self {
            settler,
            provider,
            keystore,
            registry,
            channels,
            chain,
            transactor,
            hermes,
            pay_settler,
            promises,
            history,
        }
    }

    /// Insert a channel with `HERMES` for the harness provider.
    pub fn add_channel(&self, stake: Decimal, balance: Decimal, settled: Decimal, promised: Decimal) -> Channel {
        let channel = Channel::dummy(self.provider, HERMES, stake, balance, settled, promised);
        self.channels.insert(channel.clone());
        channel
    }

    pub fn is_settling(&self) -> bool {
        self.settler.state().is_settling(&self.provider)
    }
}
