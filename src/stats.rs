use crate::{
    checker::{Op, SuccessRate, Tally},
    config::{FAIL_THRESHOLD, MIN_SAMPLES, SUCC_THRESHOLD},
    error::ChaosError,
};
use serde::{Deserialize, Serialize};
use slog::{info, Logger};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    #[default]
    Succ,
    Fail,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Succ => f.write_str("Succ"),
            Expectation::Fail => f.write_str("Fail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub succ: f64,
    pub fail: f64,
    pub min_samples: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            succ: SUCC_THRESHOLD,
            fail: FAIL_THRESHOLD,
            min_samples: MIN_SAMPLES,
        }
    }
}

impl Thresholds {
    /// Whether a tally meets `expectation`.
    ///
    /// A failing op passes with a low rate or too few samples to judge; a
    /// succeeding op passes with a high rate or more than `min_samples` attempts.
    pub fn holds(&self, expectation: Expectation, succ_rate: f64, total: u64) -> bool {
        match expectation {
            Expectation::Fail => succ_rate < self.fail || total < self.min_samples,
            Expectation::Succ => succ_rate > self.succ || total > self.min_samples,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Violation {
    pub op: Op,
    pub expectation: Expectation,
    pub succ_rate: f64,
    pub total: u64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expect {}: {} succ rate {}, total: {}",
            self.expectation, self.op, self.succ_rate, self.total
        )
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct StatisticEntry {
    pub op: Op,
    pub expectation: Expectation,
    pub succ_rate: f64,
    pub total: u64,
    pub passed: bool,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct StatisticReport {
    pub entries: Vec<StatisticEntry>,
}

impl StatisticReport {
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|entry| entry.passed)
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.entries
            .iter()
            .filter(|entry| !entry.passed)
            .map(|entry| Violation {
                op: entry.op,
                expectation: entry.expectation,
                succ_rate: entry.succ_rate,
                total: entry.total,
            })
            .collect()
    }
}

/// Judges every checker against its expectation, defaulting to success.
///
/// All checkers are evaluated and logged before any violation is reported.
pub fn evaluate<T: SuccessRate>(
    checkers: &BTreeMap<Op, T>,
    expectations: &HashMap<Op, Expectation>,
    thresholds: &Thresholds,
    logger: &Logger,
) -> StatisticReport {
    let entries = checkers
        .iter()
        .map(|(op, checker)| {
            let expectation = expectations.get(op).copied().unwrap_or_default();
            let succ_rate = checker.succ_rate();
            let total = checker.total();

            info!(logger, "Expect {expectation}: {op} succ rate {succ_rate}, total: {total}");

            StatisticEntry {
                op: *op,
                expectation,
                succ_rate,
                total,
                passed: thresholds.holds(expectation, succ_rate, total),
            }
        })
        .collect();

    StatisticReport { entries }
}

/// [`evaluate`], turning any violation into an error.
pub fn assert_statistic<T: SuccessRate>(
    checkers: &BTreeMap<Op, T>,
    expectations: &HashMap<Op, Expectation>,
    thresholds: &Thresholds,
    logger: &Logger,
) -> Result<StatisticReport, ChaosError> {
    let report = evaluate(checkers, expectations, thresholds, logger);

    if report.passed() {
        Ok(report)
    } else {
        Err(ChaosError::Expectations(report.violations()))
    }
}

/// Latency percentiles of a checker's attempts, in milliseconds.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub p50: f64,
    pub p95: f64,
    /// `(label, value)` for p99, p999, ... up to the requested number of nines.
    pub nines: Vec<(String, f64)>,
    pub max: f64,
}

impl LatencySummary {
    /// `None` without samples. `p9` is the number of nines to report, from 2 up.
    pub fn from_secs(samples: &[f64], p9: usize) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut latencies = samples
            .iter()
            .map(|secs| secs * 1000.0) // Convert s to ms
            .collect::<Vec<_>>();
        latencies.sort_unstable_by(|a, b| a.total_cmp(b));

        let len = latencies.len();
        let at = |fraction: f64| latencies[((len as f64 * fraction) as usize).min(len - 1)];

        let nines = (2..=p9)
            .map(|digits| {
                let factor = 1.0 - 0.1f64.powi(digits as i32);
                (format!("p{}", "9".repeat(digits)), at(factor))
            })
            .collect();

        Some(LatencySummary {
            count: len,
            avg: latencies.iter().sum::<f64>() / len as f64,
            min: latencies[0],
            p50: at(0.50),
            p95: at(0.95),
            nines,
            max: latencies[len - 1],
        })
    }

    pub fn log(&self, logger: &Logger, for_what: &str) {
        info!(logger, "Avg {for_what} latency: {:.2} ms", self.avg);
        info!(logger, "Min {for_what} latency: {:.2} ms", self.min);
        info!(logger, "p50 {for_what} latency: {:.2} ms", self.p50);
        info!(logger, "p95 {for_what} latency: {:.2} ms", self.p95);
        for (label, value) in &self.nines {
            info!(logger, "{label} {for_what} latency: {value:.2} ms");
        }
        info!(logger, "Max {for_what} latency: {:.2} ms", self.max);
    }
}

/// Logs latency percentiles for every checker that recorded attempts.
pub fn log_latencies(tallies: &BTreeMap<Op, Tally>, p9: usize, logger: &Logger) {
    for (op, tally) in tallies {
        if let Some(summary) = LatencySummary::from_secs(&tally.latencies, p9) {
            summary.log(logger, op.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::discard;

    fn tallies(entries: &[(Op, u64, u64)]) -> BTreeMap<Op, Tally> {
        entries
            .iter()
            .map(|(op, succ, fail)| (*op, Tally::new(*succ, *fail)))
            .collect()
    }

    #[test]
    fn test_thresholds_for_expected_failure() {
        let t = Thresholds::default();
        assert!(t.holds(Expectation::Fail, 0.2, 100));
        assert!(t.holds(Expectation::Fail, 1.0, 1));
        assert!(!t.holds(Expectation::Fail, 0.49, 100));
        assert!(!t.holds(Expectation::Fail, 0.8, 2));
    }

    #[test]
    fn test_thresholds_for_expected_success() {
        let t = Thresholds::default();
        assert!(t.holds(Expectation::Succ, 0.95, 1));
        assert!(t.holds(Expectation::Succ, 0.0, 3));
        assert!(!t.holds(Expectation::Succ, 0.90, 2));
        assert!(!t.holds(Expectation::Succ, 0.0, 0));
    }

    #[test]
    fn test_missing_expectation_defaults_to_success() {
        let checkers = tallies(&[(Op::Search, 10, 0), (Op::Query, 0, 0)]);
        let report = evaluate(
            &checkers,
            &HashMap::new(),
            &Thresholds::default(),
            &discard(),
        );

        assert_eq!(report.entries.len(), 2);
        assert!(report
            .entries
            .iter()
            .all(|e| e.expectation == Expectation::Succ));
        // A checker that never ran cannot meet a success expectation.
        assert_eq!(report.violations().len(), 1);
        assert_eq!(report.violations()[0].op, Op::Query);
    }

    #[test]
    fn test_assert_statistic_collects_every_violation() {
        let checkers = tallies(&[
            (Op::Search, 10, 0),
            (Op::Insert, 0, 0),
            (Op::Create, 9, 1),
        ]);
        let expectations = HashMap::from_iter([
            (Op::Search, Expectation::Fail),
            (Op::Create, Expectation::Fail),
        ]);

        let err = assert_statistic(
            &checkers,
            &expectations,
            &Thresholds::default(),
            &discard(),
        )
        .unwrap_err();

        match err {
            ChaosError::Expectations(violations) => {
                let ops = violations.iter().map(|v| v.op).collect::<Vec<_>>();
                assert_eq!(ops, vec![Op::Create, Op::Insert, Op::Search]);
                assert_eq!(
                    violations[2].to_string(),
                    "Expect Fail: search succ rate 1, total: 10"
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_assert_statistic_passes() {
        let checkers = tallies(&[(Op::Search, 0, 20), (Op::Query, 19, 1)]);
        let expectations = HashMap::from_iter([(Op::Search, Expectation::Fail)]);

        let report = assert_statistic(
            &checkers,
            &expectations,
            &Thresholds::default(),
            &discard(),
        )
        .unwrap();
        assert!(report.passed());
    }

    #[test]
    fn test_latency_summary() {
        assert!(LatencySummary::from_secs(&[], 3).is_none());

        let samples = (1..=100).map(|ms| ms as f64 / 1000.0).collect::<Vec<_>>();
        let summary = LatencySummary::from_secs(&samples, 3).unwrap();

        assert_eq!(summary.count, 100);
        assert!((summary.min - 1.0).abs() < 1e-9);
        assert!((summary.max - 100.0).abs() < 1e-9);
        assert!((summary.avg - 50.5).abs() < 1e-9);
        assert!((summary.p50 - 51.0).abs() < 1e-9);
        assert_eq!(summary.nines.len(), 2);
        assert_eq!(summary.nines[0].0, "p99");
        assert_eq!(summary.nines[1].0, "p999");
        assert!((summary.nines[1].1 - 100.0).abs() < 1e-9);
    }
}
