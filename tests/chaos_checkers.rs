mod common;

use common::fast_config;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use vecchaos::{
    checker::{set::CheckerSet, Op, SuccessRate},
    client::{
        memory::{FaultInjector, FaultPlan, InMemoryClient},
        types::{CollectionSchema, Entities, IndexParams, SearchRequest, SearchResult},
        VectorClient,
    },
    error::{ChaosError, ClientResult},
    logging::discard,
    scenario::{Phase, Scenario, ScenarioRunner},
    stats::Expectation,
};

const RUN_FOR: Duration = Duration::from_millis(300);

/// Counters and target state read while a single checker is still running.
struct RunSummary {
    succ: u64,
    fail: u64,
    entities: u64,
    other_collections: usize,
}

async fn run_single(client: &InMemoryClient, op: Op) -> RunSummary {
    let checkers = CheckerSet::start(Arc::new(client.clone()), fast_config(), &[op], discard())
        .await
        .unwrap();

    tokio::time::sleep(RUN_FOR).await;

    let handle = checkers.get(op).unwrap();
    let (succ, fail) = (handle.counters.succ(), handle.counters.fail());
    let entities = client.num_entities(&handle.collection).await.unwrap();
    let other_collections = client
        .collection_names()
        .await
        .into_iter()
        .filter(|name| name != &handle.collection)
        .count();
    let collection = handle.collection.clone();

    checkers.stop().await;
    assert!(!client.has_collection(&collection).await.unwrap());

    RunSummary {
        succ,
        fail,
        entities,
        other_collections,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_search_checker_succeeds_on_healthy_target() {
    let run = run_single(&InMemoryClient::new(), Op::Search).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_query_checker_succeeds_on_healthy_target() {
    let run = run_single(&InMemoryClient::new(), Op::Query).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_insert_checker_grows_collection() {
    let run = run_single(&InMemoryClient::new(), Op::Insert).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
    assert!(run.entities >= 50 + 10 * run.succ, "entities: {}", run.entities);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_checker_tracks_entity_count() {
    let run = run_single(&InMemoryClient::new(), Op::Flush).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
    assert!(run.entities >= 50 + 10 * run.succ, "entities: {}", run.entities);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_create_checker_drops_what_it_creates() {
    let run = run_single(&InMemoryClient::new(), Op::Create).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
    // At most the attempt in flight.
    assert!(run.other_collections <= 1, "leftovers: {}", run.other_collections);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_index_checker_drops_what_it_builds() {
    let run = run_single(&InMemoryClient::new(), Op::Index).await;
    assert!(run.succ > 2, "succ: {}", run.succ);
    assert_eq!(run.fail, 0);
    assert_eq!(run.entities, 50 + 5 * 50);
}

/// Acknowledges inserts without storing them while `lose_inserts` is set.
#[derive(Clone)]
struct LossyClient {
    inner: InMemoryClient,
    lose_inserts: Arc<AtomicBool>,
}

#[async_trait]
impl VectorClient for LossyClient {
    async fn connect(&self) -> ClientResult<()> {
        self.inner.connect().await
    }

    fn disconnect(&self) {
        self.inner.disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn has_collection(&self, name: &str) -> ClientResult<bool> {
        self.inner.has_collection(name).await
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> ClientResult<()> {
        self.inner.create_collection(name, schema).await
    }

    async fn drop_collection(&self, name: &str) -> ClientResult<()> {
        self.inner.drop_collection(name).await
    }

    async fn load_collection(&self, name: &str) -> ClientResult<()> {
        self.inner.load_collection(name).await
    }

    async fn insert(&self, name: &str, entities: &Entities) -> ClientResult<u64> {
        if self.lose_inserts.load(Ordering::SeqCst) {
            return Ok(entities.len() as u64);
        }
        self.inner.insert(name, entities).await
    }

    async fn num_entities(&self, name: &str) -> ClientResult<u64> {
        self.inner.num_entities(name).await
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> ClientResult<SearchResult> {
        self.inner.search(name, request).await
    }

    async fn query(&self, name: &str, expr: &str) -> ClientResult<Vec<Value>> {
        self.inner.query(name, expr).await
    }

    async fn create_index(
        &self,
        name: &str,
        field_name: &str,
        params: &IndexParams,
        index_name: &str,
    ) -> ClientResult<()> {
        self.inner
            .create_index(name, field_name, params, index_name)
            .await
    }

    async fn drop_index(&self, name: &str) -> ClientResult<()> {
        self.inner.drop_index(name).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_checker_fails_on_lost_inserts_then_recovers() {
    let client = LossyClient {
        inner: InMemoryClient::new(),
        lose_inserts: Arc::new(AtomicBool::new(false)),
    };
    let checkers = CheckerSet::start(Arc::new(client.clone()), fast_config(), &[Op::Flush], discard())
        .await
        .unwrap();

    // Acknowledged but unstored batches leave the count short of the expected growth.
    client.lose_inserts.store(true, Ordering::SeqCst);
    checkers.reset();
    tokio::time::sleep(RUN_FOR).await;

    let lossy = checkers.tallies()[&Op::Flush].clone();
    // One attempt may have inserted before the switch.
    assert!(lossy.succ <= 1, "{lossy:?}");
    assert!(lossy.fail > 2, "{lossy:?}");

    // The checker resyncs to the observed count, so success comes back.
    client.lose_inserts.store(false, Ordering::SeqCst);
    checkers.reset();
    tokio::time::sleep(RUN_FOR).await;

    let recovered = checkers.tallies()[&Op::Flush].clone();
    assert!(recovered.succ > 2, "{recovered:?}");
    assert!(recovered.fail <= 1, "{recovered:?}");

    checkers.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unavailable_target_fails_every_attempt() {
    let client = InMemoryClient::new();
    let checkers = CheckerSet::start(
        Arc::new(client.clone()),
        fast_config(),
        &Op::CHECKED,
        discard(),
    )
    .await
    .unwrap();

    client.inject(FaultPlan::unavailable());
    checkers.reset();
    tokio::time::sleep(RUN_FOR).await;

    let tallies = checkers.tallies();
    assert_eq!(tallies.len(), Op::CHECKED.len());
    for (op, tally) in tallies {
        assert!(tally.total() > 2, "{op}: {tally:?}");
        assert!(tally.succ_rate() < 0.49, "{op}: {tally:?}");
    }

    client.clear();
    checkers.stop().await;
    let leftovers = client.collection_names().await;
    assert!(
        leftovers.iter().all(|name| !name.starts_with("Checker_")),
        "{leftovers:?}"
    );
}

#[tokio::test]
async fn test_provision_fails_on_disconnected_client() {
    let client = InMemoryClient::new();
    client.disconnect();

    let result = CheckerSet::start(Arc::new(client), fast_config(), &[Op::Search], discard()).await;
    assert!(matches!(result, Err(ChaosError::Provision(_))));
}

#[tokio::test]
async fn test_failed_start_drops_provisioned_collections() {
    let client = InMemoryClient::new();
    let result = CheckerSet::start(
        Arc::new(client.clone()),
        fast_config(),
        &[Op::Search, Op::Query, Op::Unknown],
        discard(),
    )
    .await;

    assert!(matches!(result, Err(ChaosError::Config(_))));
    assert!(client.collection_names().await.is_empty());
}

#[tokio::test]
async fn test_unknown_op_has_no_checker() {
    let client = InMemoryClient::new();
    let result = CheckerSet::start(Arc::new(client), fast_config(), &[Op::Unknown], discard()).await;
    assert!(matches!(result, Err(ChaosError::Config(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_scenario_passes_on_in_process_target() {
    let client = InMemoryClient::new();
    let injector: Arc<dyn FaultInjector> = Arc::new(client.clone());

    let mut runner = ScenarioRunner::new(Arc::new(client.clone()), fast_config(), discard());
    runner.injector = Some(injector);

    let scenario = Scenario::default_for(&runner.ops, RUN_FOR);
    let report = runner.run(&scenario).await.unwrap();

    assert_eq!(report.phases.len(), 3);
    assert!(report.passed(), "{:#?}", report);
    assert!(client.fault_plan().is_healthy());
    assert!(runner.state.finished.read().await.len() == 3);
    assert!(runner.state.phase.read().await.is_none());

    // Checker collections are dropped when the run ends.
    let leftovers = client.collection_names().await;
    assert!(
        leftovers.iter().all(|name| !name.starts_with("Checker_")),
        "{leftovers:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scenario_reports_unmet_expectations() {
    let client = InMemoryClient::new();
    let injector: Arc<dyn FaultInjector> = Arc::new(client.clone());

    let mut runner = ScenarioRunner::new(Arc::new(client), fast_config(), discard());
    runner.injector = Some(injector);
    runner.ops = vec![Op::Search];

    // Healthy target, but the phase claims search should fail.
    let scenario = Scenario {
        phases: vec![Phase {
            name: "wrong-expectation".to_string(),
            duration_ms: RUN_FOR.as_millis() as u64,
            expectations: HashMap::from_iter([(Op::Search, Expectation::Fail)]),
            fault: None,
        }],
    };

    let report = runner.run(&scenario).await.unwrap();
    assert!(!report.passed());

    match report.into_result() {
        Err(ChaosError::Expectations(violations)) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].op, Op::Search);
            assert_eq!(violations[0].expectation, Expectation::Fail);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
