//! Orchestrator Tests
//! Startup gate, per-network isolation, dispatch, retrain, cancellation and reporting

use ai_engine::{BootstrapRule, ClassifierGate, GateConfig, GateEvent, Model, Sample, Trainer};
use async_trait::async_trait;
use dispatcher::{Account, Dispatcher, TransactionSigner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use ultron_agent::{
    AgentError, Components, Execution, JsonlReportSink, Notifier, NotifyError, Orchestrator,
    OrchestratorSettings, OrchestratorState, ReportSink, TickReport,
};
use ultron_core::{
    Address, Bytes, ChainClient, ClientFactory, Network, NetworkId, OutgoingTransaction,
    PendingTransaction, Result, SignedTransaction, TxHash, UltronError, U256,
};

// ================================================================================================
// Mocks
// ================================================================================================

#[derive(Default)]
struct MockChain {
    endpoint: String,
    dead: AtomicBool,
    fail_pending: AtomicBool,
    pending: Mutex<Vec<PendingTransaction>>,
    polls: AtomicUsize,
    submitted: AtomicUsize,
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(UltronError::ConnectionError("connection refused".to_string()));
        }
        Ok(100)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(1)
    }

    async fn pending_transactions(&self) -> Result<Vec<PendingTransaction>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pending.load(Ordering::SeqCst) {
            return Err(UltronError::RpcError("pending block unavailable".to_string()));
        }
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn transaction_count(&self, _address: &Address) -> Result<u64> {
        Ok(0)
    }

    async fn send_raw_transaction(&self, _raw: &Bytes) -> Result<TxHash> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxHash::repeat_byte(n as u8))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Default)]
struct MockFactory {
    chains: HashMap<NetworkId, Arc<MockChain>>,
}

impl MockFactory {
    fn with(mut self, id: &str, alive: bool, values: &[u64]) -> Self {
        let chain = MockChain {
            endpoint: format!("http://{}.rpc", id.to_lowercase()),
            pending: Mutex::new(values.iter().map(|&v| pending(v)).collect()),
            ..Default::default()
        };
        chain.dead.store(!alive, Ordering::SeqCst);
        self.chains.insert(NetworkId::new(id), Arc::new(chain));
        self
    }

    fn chain(&self, id: &str) -> Arc<MockChain> {
        Arc::clone(&self.chains[&NetworkId::new(id)])
    }

    fn networks(&self) -> Vec<Network> {
        let mut ids: Vec<&NetworkId> = self.chains.keys().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| {
                Network::new(id.as_str(), format!("http://{}.rpc", id.as_str().to_lowercase()))
            })
            .collect()
    }
}

impl ClientFactory for MockFactory {
    fn connect(&self, network: &Network) -> Result<Arc<dyn ChainClient>> {
        self.chains
            .get(&network.id)
            .map(|chain| Arc::clone(chain) as Arc<dyn ChainClient>)
            .ok_or_else(|| UltronError::ConnectionError("unknown network".to_string()))
    }
}

#[derive(Default)]
struct MockSigner {
    fail: bool,
    cancel_after_sign: Option<CancellationToken>,
}

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn sign(
        &self,
        _account: &Account,
        tx: &OutgoingTransaction,
    ) -> Result<SignedTransaction> {
        if self.fail {
            return Err(UltronError::SigningError("hardware wallet unplugged".to_string()));
        }
        if let Some(cancel) = &self.cancel_after_sign {
            cancel.cancel();
        }
        SignedTransaction::new(format!("0x{:02x}", tx.nonce))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> std::result::Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink {
    reports: Mutex<Vec<TickReport>>,
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn save(&self, report: &TickReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl ReportSink for FailingSink {
    async fn save(&self, _report: &TickReport) -> Result<()> {
        Err(UltronError::ReportError("disk full".to_string()))
    }
}

struct ConstModel(bool);

impl Model for ConstModel {
    fn predict(&self, _row: &[f64]) -> Result<bool> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "const"
    }
}

struct ConstTrainer;

impl Trainer for ConstTrainer {
    fn fit(&self, _samples: &[Sample]) -> Result<Box<dyn Model>> {
        Ok(Box::new(ConstModel(false)))
    }
}

// ================================================================================================
// Helpers
// ================================================================================================

fn pending(value: u64) -> PendingTransaction {
    PendingTransaction {
        value: U256::from(value),
        gas_price: 20_000_000_000,
        gas_limit: 21_000,
        max_fee_per_gas: None,
    }
}

/// Approves every transaction worth at least 1000 wei
fn approving_gate() -> Arc<ClassifierGate> {
    Arc::new(ClassifierGate::new(GateConfig::default().with_bootstrap(
        BootstrapRule {
            min_value_wei: 1_000,
            min_gas_price_wei: 0,
        },
    )))
}

fn execution(signer: MockSigner) -> Option<Execution> {
    Some(Execution {
        dispatcher: Dispatcher::new(Arc::new(signer)),
        account: Account::new(Address::repeat_byte(0x77), "test"),
    })
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        poll_interval: Duration::from_secs(3600),
        poll_timeout: Some(Duration::from_secs(1)),
        check_timeout: Duration::from_secs(1),
    }
}

struct Harness {
    orchestrator: Orchestrator,
    notifier: Arc<RecordingNotifier>,
    sink: Arc<MemorySink>,
}

async fn start(
    factory: Arc<MockFactory>,
    gate: Arc<ClassifierGate>,
    execution: Option<Execution>,
) -> std::result::Result<Harness, AgentError> {
    let notifier = Arc::new(RecordingNotifier::default());
    let sink = Arc::new(MemorySink::default());
    let components = Components {
        gate,
        execution,
        notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
        reports: Arc::clone(&sink) as Arc<dyn ReportSink>,
    };

    let orchestrator = Orchestrator::start(
        factory.networks(),
        factory as Arc<dyn ClientFactory>,
        components,
        settings(),
    )
    .await?;

    Ok(Harness {
        orchestrator,
        notifier,
        sink,
    })
}

// ================================================================================================
// Tests
// ================================================================================================

/// Test: Zero healthy networks is a startup failure
#[tokio::test]
async fn test_startup_fatal_without_healthy_networks() {
    let factory = Arc::new(MockFactory::default().with("ETH", false, &[]).with("BSC", false, &[]));

    let result = start(factory, approving_gate(), None).await;
    assert!(matches!(
        result,
        Err(AgentError::StartupFatal(UltronError::NoHealthyEndpoints))
    ));
}

/// Test: Successful start announces the healthy networks
#[tokio::test]
async fn test_startup_notification() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[]).with("BSC", false, &[]));

    let harness = start(factory, approving_gate(), None).await.unwrap();

    assert_eq!(harness.orchestrator.state(), OrchestratorState::Running);
    let messages = harness.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("1/2"));
    assert!(messages[0].contains("ETH"));
}

/// Test: Empty pending set completes the tick without predictions
#[tokio::test]
async fn test_empty_pending_set() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[]));
    let gate = approving_gate();
    let harness = start(factory, Arc::clone(&gate), execution(MockSigner::default()))
        .await
        .unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert_eq!(report.networks.len(), 1);
    assert!(report.networks[0].polled);
    assert_eq!(report.networks[0].transactions, 0);
    assert_eq!(report.dispatched(), 0);
    assert_eq!(gate.buffer_len(), 0);
    assert_eq!(harness.orchestrator.state(), OrchestratorState::Running);
}

/// Test: Only approved vectors are dispatched, each success is announced
#[tokio::test]
async fn test_approved_transactions_dispatched() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[500, 5_000, 9_000]));
    let chain = factory.chain("ETH");
    let gate = approving_gate();
    let harness = start(factory, Arc::clone(&gate), execution(MockSigner::default()))
        .await
        .unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert_eq!(report.networks[0].transactions, 3);
    assert_eq!(report.approved(), 2);
    assert_eq!(report.dispatched(), 2);
    assert_eq!(chain.submitted.load(Ordering::SeqCst), 2);
    assert_eq!(gate.buffer_len(), 3);

    let trades: Vec<String> = harness
        .notifier
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("✅ Trade executed: 0x"))
        .collect();
    assert_eq!(trades.len(), 2);
}

/// Test: Observe-only mode counts approvals but sends nothing
#[tokio::test]
async fn test_observe_only() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000]));
    let chain = factory.chain("ETH");
    let harness = start(factory, approving_gate(), None).await.unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert_eq!(report.approved(), 1);
    assert_eq!(report.dispatched(), 0);
    assert_eq!(chain.submitted.load(Ordering::SeqCst), 0);
}

/// Test: A poll failure on one network does not stop the others
#[tokio::test]
async fn test_poll_failure_isolated() {
    let factory = Arc::new(
        MockFactory::default()
            .with("BSC", true, &[5_000])
            .with("ETH", true, &[5_000]),
    );
    factory.chain("BSC").fail_pending.store(true, Ordering::SeqCst);
    let harness = start(Arc::clone(&factory), approving_gate(), execution(MockSigner::default()))
        .await
        .unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    let bsc = &report.networks[0];
    let eth = &report.networks[1];
    assert_eq!(bsc.network.as_str(), "BSC");
    assert!(!bsc.polled);
    assert!(bsc.error.as_deref().unwrap().contains("BSC"));
    assert_eq!(eth.dispatched, 1);

    // Liveness still passes, so BSC stays registered
    assert_eq!(harness.orchestrator.registry().len().await, 2);
    assert_eq!(report.state, OrchestratorState::Degraded);
}

/// Test: A failed dispatch is logged and the tick carries on
#[tokio::test]
async fn test_dispatch_failure_isolated() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000, 6_000]));
    let signer = MockSigner {
        fail: true,
        ..Default::default()
    };
    let harness = start(factory, approving_gate(), execution(signer)).await.unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert_eq!(report.approved(), 2);
    assert_eq!(report.networks[0].failed_dispatches, 2);
    assert_eq!(report.state, OrchestratorState::Running);
}

/// Test: Fewer healthy than configured networks is Degraded
#[tokio::test]
async fn test_missing_network_degrades() {
    let factory = Arc::new(
        MockFactory::default()
            .with("ETH", true, &[])
            .with("POLYGON", false, &[]),
    );
    let harness = start(factory, approving_gate(), None).await.unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert_eq!(report.configured_networks, 2);
    assert_eq!(report.healthy_networks, 1);
    assert_eq!(harness.orchestrator.state(), OrchestratorState::Degraded);
}

/// Test: Losing the only network degrades the tick and the next tick polls it again
#[tokio::test]
async fn test_lost_network_recovers_next_tick() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000]));
    let harness = start(Arc::clone(&factory), approving_gate(), None).await.unwrap();

    let chain = factory.chain("ETH");
    chain.dead.store(true, Ordering::SeqCst);
    chain.fail_pending.store(true, Ordering::SeqCst);

    let first = harness.orchestrator.tick(&CancellationToken::new()).await;
    assert!(!first.networks[0].polled);
    assert_eq!(first.state, OrchestratorState::Degraded);
    assert_eq!(harness.orchestrator.registry().len().await, 0);

    // Still down: the tick completes with nothing to poll
    let empty = harness.orchestrator.tick(&CancellationToken::new()).await;
    assert!(empty.networks.is_empty());
    assert_eq!(empty.healthy_networks, 0);
    assert_eq!(empty.state, OrchestratorState::Degraded);

    chain.dead.store(false, Ordering::SeqCst);
    chain.fail_pending.store(false, Ordering::SeqCst);
    let polls_before = chain.polls.load(Ordering::SeqCst);

    let recovered = harness.orchestrator.tick(&CancellationToken::new()).await;
    assert_eq!(chain.polls.load(Ordering::SeqCst), polls_before + 1);
    assert!(recovered.networks[0].polled);
    assert_eq!(recovered.approved(), 1);
    assert_eq!(recovered.state, OrchestratorState::Running);
}

/// Test: A network that fails once is polled again alongside the others on the next tick
#[tokio::test]
async fn test_failed_network_polled_again() {
    let factory = Arc::new(
        MockFactory::default()
            .with("BSC", true, &[5_000])
            .with("ETH", true, &[5_000]),
    );
    let bsc = factory.chain("BSC");
    let harness = start(Arc::clone(&factory), approving_gate(), None).await.unwrap();

    bsc.dead.store(true, Ordering::SeqCst);
    bsc.fail_pending.store(true, Ordering::SeqCst);
    let first = harness.orchestrator.tick(&CancellationToken::new()).await;
    assert!(!first.networks[0].polled);
    assert_eq!(harness.orchestrator.registry().len().await, 1);

    bsc.dead.store(false, Ordering::SeqCst);
    bsc.fail_pending.store(false, Ordering::SeqCst);
    let polls_before = bsc.polls.load(Ordering::SeqCst);

    let second = harness.orchestrator.tick(&CancellationToken::new()).await;
    assert_eq!(bsc.polls.load(Ordering::SeqCst), polls_before + 1);
    let polled: Vec<&str> = second
        .networks
        .iter()
        .filter(|n| n.polled)
        .map(|n| n.network.as_str())
        .collect();
    assert_eq!(polled, vec!["BSC", "ETH"]);
    assert_eq!(second.state, OrchestratorState::Running);
}

/// Test: Cancellation before a tick skips all network work
#[tokio::test]
async fn test_cancelled_before_tick() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000]));
    let chain = factory.chain("ETH");
    let harness = start(factory, approving_gate(), None).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = harness.orchestrator.tick(&cancel).await;

    assert!(report.cancelled);
    assert!(report.networks.is_empty());
    assert_eq!(chain.polls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.orchestrator.state(), OrchestratorState::ShuttingDown);
}

/// Test: Cancellation mid-tick lets the in-flight dispatch finish and starts no new one
#[tokio::test]
async fn test_cancelled_mid_tick() {
    let factory = Arc::new(
        MockFactory::default()
            .with("BSC", true, &[5_000, 6_000])
            .with("ETH", true, &[7_000]),
    );
    let bsc = factory.chain("BSC");
    let eth = factory.chain("ETH");
    let cancel = CancellationToken::new();
    let signer = MockSigner {
        cancel_after_sign: Some(cancel.clone()),
        ..Default::default()
    };
    let harness = start(Arc::clone(&factory), approving_gate(), execution(signer))
        .await
        .unwrap();

    let report = harness.orchestrator.tick(&cancel).await;

    assert!(report.cancelled);
    assert_eq!(bsc.submitted.load(Ordering::SeqCst), 1);
    assert_eq!(eth.submitted.load(Ordering::SeqCst), 0);
    assert!(report.retrain.is_none());
}

/// Test: Reaching the sample threshold retrains once and announces accuracy
#[tokio::test]
async fn test_retrain_after_threshold() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[1, 2, 3, 4]));
    let gate = Arc::new(ClassifierGate::with_trainer(
        GateConfig::default().with_threshold(4).with_seed(5),
        Arc::new(ConstTrainer),
    ));
    let harness = start(factory, Arc::clone(&gate), None).await.unwrap();

    let report = harness.orchestrator.tick(&CancellationToken::new()).await;

    assert!(matches!(
        report.retrain,
        Some(GateEvent::ModelRetrained { samples: 4, .. })
    ));
    assert_eq!(report.model_generation, 1);
    assert!(harness
        .notifier
        .messages()
        .iter()
        .any(|m| m.starts_with("🤖 Model retrained! Accuracy: ")));
}

/// Test: Every tick hands a report to the sink; sink failures are swallowed
#[tokio::test]
async fn test_reports_saved() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000]));
    let harness = start(Arc::clone(&factory), approving_gate(), None).await.unwrap();

    harness.orchestrator.tick(&CancellationToken::new()).await;
    harness.orchestrator.tick(&CancellationToken::new()).await;

    let reports = harness.sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].tick, 2);
    assert_eq!(reports[0].run_id, harness.orchestrator.run_id());

    let components = Components {
        gate: approving_gate(),
        execution: None,
        notifier: Arc::new(RecordingNotifier::default()),
        reports: Arc::new(FailingSink),
    };
    let orchestrator = Orchestrator::start(factory.networks(), factory, components, settings())
        .await
        .unwrap();
    let report = orchestrator.tick(&CancellationToken::new()).await;
    assert_eq!(report.tick, 1);
}

/// Test: JSONL sink appends one parseable line per tick
#[tokio::test]
async fn test_jsonl_sink_appends_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("ticks.jsonl");

    let factory = Arc::new(MockFactory::default().with("ETH", true, &[5_000]));
    let components = Components {
        gate: approving_gate(),
        execution: None,
        notifier: Arc::new(RecordingNotifier::default()),
        reports: Arc::new(JsonlReportSink::new(path.clone())),
    };
    let orchestrator = Orchestrator::start(factory.networks(), factory, components, settings())
        .await
        .unwrap();

    orchestrator.tick(&CancellationToken::new()).await;
    orchestrator.tick(&CancellationToken::new()).await;

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["tick"], 1);
    assert_eq!(lines[1]["networks"][0]["network"], "ETH");
    assert_eq!(lines[1]["state"], "running");
}

/// Test: run returns cleanly once cancelled during the inter-tick sleep
#[tokio::test]
async fn test_run_stops_on_cancel() {
    let factory = Arc::new(MockFactory::default().with("ETH", true, &[]));
    let chain = factory.chain("ETH");
    let harness = start(factory, approving_gate(), None).await.unwrap();
    let orchestrator = Arc::new(harness.orchestrator);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chain.polls.load(Ordering::SeqCst), 1);
    assert_eq!(orchestrator.state(), OrchestratorState::ShuttingDown);
}
