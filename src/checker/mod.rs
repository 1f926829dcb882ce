//! Chaos checkers.
//!
//! A checker owns a freshly provisioned collection and hammers the database with
//! one kind of operation, tallying every attempt as a success or a failure. The
//! tallies are compared against expectations once a phase of a chaos run ends.

pub mod create;
pub mod index;
pub mod insert_flush;
pub mod query;
pub mod search;
pub mod set;

use crate::{
    client::{CollectionWrapper, VectorClient},
    config::ChaosConfig,
    datagen::{gen_default_collection_schema, gen_default_list_data, gen_unique_str},
    error::ChaosError,
};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use slog::{debug, info, o, warn, Logger};
use std::{
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{sync::watch, time::Instant};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Create,
    Insert,
    Flush,
    Index,
    Search,
    Query,
    Unknown,
}

impl Op {
    /// Every op backed by a checker.
    pub const CHECKED: [Op; 6] = [
        Op::Create,
        Op::Insert,
        Op::Flush,
        Op::Index,
        Op::Search,
        Op::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Insert => "insert",
            Op::Flush => "flush",
            Op::Index => "index",
            Op::Search => "search",
            Op::Query => "query",
            Op::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "create" => Op::Create,
            "insert" => Op::Insert,
            "flush" => Op::Flush,
            "index" => Op::Index,
            "search" => Op::Search,
            "query" => Op::Query,
            _ => Op::Unknown,
        };
        Ok(op)
    }
}

/// Anything with a success/failure tally.
pub trait SuccessRate {
    fn succ(&self) -> u64;
    fn fail(&self) -> u64;

    fn total(&self) -> u64 {
        self.succ() + self.fail()
    }

    /// `0.0` until the first attempt is recorded.
    fn succ_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.succ() as f64 / total as f64
        }
    }
}

/// Point-in-time copy of a checker's counters.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Tally {
    pub succ: u64,
    pub fail: u64,
    /// Attempt durations in seconds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub latencies: Vec<f64>,
}

impl Tally {
    pub fn new(succ: u64, fail: u64) -> Self {
        Tally {
            succ,
            fail,
            latencies: vec![],
        }
    }
}

impl SuccessRate for Tally {
    fn succ(&self) -> u64 {
        self.succ
    }

    fn fail(&self) -> u64 {
        self.fail
    }
}

const MAX_LATENCY_SAMPLES: usize = 100_000;

/// Written by the owning loop, read by whoever aggregates.
#[derive(Default)]
pub struct Counters {
    succ: AtomicU64,
    fail: AtomicU64,
    latencies: Mutex<Vec<f64>>,
}

impl Counters {
    pub fn record(&self, success: bool, elapsed: Duration) {
        if success {
            self.succ.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fail.fetch_add(1, Ordering::Relaxed);
        }

        let seen = self.total();
        let mut latencies = match self.latencies.lock() {
            Ok(latencies) => latencies,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Reservoir sampling keeps memory bounded for checkers that never sleep.
        if latencies.len() < MAX_LATENCY_SAMPLES {
            latencies.push(elapsed.as_secs_f64());
        } else {
            let slot = rand::rng().random_range(0..seen.max(1)) as usize;
            if slot < MAX_LATENCY_SAMPLES {
                latencies[slot] = elapsed.as_secs_f64();
            }
        }
    }

    pub fn reset(&self) {
        self.succ.store(0, Ordering::Relaxed);
        self.fail.store(0, Ordering::Relaxed);
        match self.latencies.lock() {
            Ok(mut latencies) => latencies.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    pub fn snapshot(&self) -> Tally {
        let latencies = match self.latencies.lock() {
            Ok(latencies) => latencies.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        Tally {
            succ: self.succ(),
            fail: self.fail(),
            latencies,
        }
    }
}

impl SuccessRate for Counters {
    fn succ(&self) -> u64 {
        self.succ.load(Ordering::Relaxed)
    }

    fn fail(&self) -> u64 {
        self.fail.load(Ordering::Relaxed)
    }
}

/// State every checker kind starts from: a collection seeded with
/// `entities_for_search` rows, its counters and the entity count seen after flushing.
pub struct Checker {
    pub collection: CollectionWrapper,
    pub counters: Arc<Counters>,
    pub initial_entities: u64,
    pub config: Arc<ChaosConfig>,
    pub logger: Logger,
}

impl Checker {
    pub async fn provision(
        client: Arc<dyn VectorClient>,
        config: Arc<ChaosConfig>,
        logger: Logger,
    ) -> Result<Self, ChaosError> {
        let name = gen_unique_str("Checker_");
        let logger = logger.new(o!("collection" => name.clone()));

        let (collection, created) = CollectionWrapper::init_collection(
            client,
            name,
            &gen_default_collection_schema(config.dim),
            config.timeout(),
        )
        .await
        .map_err(ChaosError::Provision)?;

        let seeded = match collection
            .insert(&gen_default_list_data(config.entities_for_search, config.dim))
            .await
        {
            // Reading the entity count flushes the inserted rows.
            Ok(_) => collection.num_entities().await,
            Err(e) => Err(e),
        };

        let initial_entities = match seeded {
            Ok(res) => res.result,
            Err(e) => {
                if let Err(drop_err) = collection.drop().await {
                    warn!(logger, "Failed to drop half-provisioned collection: {drop_err}");
                }
                return Err(ChaosError::Provision(e));
            }
        };

        info!(logger, "Provisioned checker collection";
            "entities" => initial_entities, "create_time" => created.time);

        Ok(Checker {
            collection,
            counters: Arc::new(Counters::default()),
            initial_entities,
            config,
            logger,
        })
    }

    pub fn total(&self) -> u64 {
        self.counters.total()
    }

    pub fn succ_rate(&self) -> f64 {
        self.counters.succ_rate()
    }

    pub fn reset(&self) {
        self.counters.reset()
    }
}

/// One checker kind: the operation it exercises and a single attempt of it.
#[async_trait]
pub trait OpChecker: Send + 'static {
    fn op(&self) -> Op;

    fn checker(&self) -> &Checker;

    /// Performs one attempt and reports whether it succeeded.
    async fn check_once(&mut self) -> bool;

    /// Pause after each attempt.
    fn pause(&self) -> Duration {
        self.checker().config.op_interval()
    }
}

/// Repeats `check_once` until `stop` flips to true or its sender goes away.
///
/// An attempt that is in flight when the stop arrives is abandoned and not counted.
pub async fn keep_running<C: OpChecker>(mut checker: C, mut stop: watch::Receiver<bool>) {
    let op = checker.op();
    let counters = checker.checker().counters.clone();
    let logger = checker.checker().logger.new(o!("op" => op.as_str()));

    info!(logger, "Checker started");

    while !*stop.borrow() {
        let instant = Instant::now();
        let success = tokio::select! {
            biased;
            _ = stop.changed() => break,
            success = checker.check_once() => success,
        };
        counters.record(success, instant.elapsed());

        if !success {
            debug!(logger, "Attempt failed"; "fail" => counters.fail());
        }

        let pause = checker.pause();
        if pause.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!(logger, "Checker stopped"; "succ" => counters.succ(), "fail" => counters.fail());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_round_trips_through_strings() {
        for op in Op::CHECKED {
            assert_eq!(op.to_string().parse::<Op>().unwrap(), op);
        }
        assert_eq!("SEARCH".parse::<Op>().unwrap(), Op::Search);
        assert_eq!("delete".parse::<Op>().unwrap(), Op::Unknown);
    }

    #[test]
    fn test_counters() {
        let counters = Counters::default();
        assert_eq!(counters.total(), 0);
        assert_eq!(counters.succ_rate(), 0.0);

        counters.record(true, Duration::from_millis(5));
        counters.record(true, Duration::from_millis(5));
        counters.record(true, Duration::from_millis(5));
        counters.record(false, Duration::from_millis(5));

        assert_eq!(counters.total(), 4);
        assert_eq!(counters.succ_rate(), 0.75);

        let snapshot = counters.snapshot();
        assert_eq!((snapshot.succ, snapshot.fail), (3, 1));
        assert_eq!(snapshot.latencies.len(), 4);

        counters.reset();
        assert_eq!(counters.total(), 0);
        assert!(counters.snapshot().latencies.is_empty());
    }

    #[test]
    fn test_tally_rate() {
        assert_eq!(Tally::new(0, 0).succ_rate(), 0.0);
        assert_eq!(Tally::new(9, 1).succ_rate(), 0.9);
        assert_eq!(Tally::new(0, 5).total(), 5);
    }
}
