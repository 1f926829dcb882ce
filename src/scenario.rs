//! Phased chaos runs.
//!
//! Checkers are started once and keep running across phases. Each phase applies
//! its fault plan, clears the counters, lets the checkers work for a while and
//! then judges their tallies against the phase's expectations.

use crate::{
    checker::{set::CheckerSet, Counters, Op, Tally},
    client::{memory::FaultInjector, memory::FaultPlan, VectorClient},
    config::{read_json, ChaosConfig},
    error::ChaosError,
    stats::{evaluate, log_latencies, Expectation, StatisticReport, Thresholds},
};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use slog::{info, o, warn, Logger};
use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: String,
    pub duration_ms: u64,
    /// Ops not listed are expected to succeed.
    #[serde(default)]
    pub expectations: HashMap<Op, Expectation>,
    /// Applied to in-process targets only; remote faults are injected from outside.
    #[serde(default)]
    pub fault: Option<FaultPlan>,
}

impl Phase {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Scenario {
    pub phases: Vec<Phase>,
}

impl Scenario {
    /// Healthy, then every op expected to fail under `fault`, then healthy again.
    pub fn default_for(ops: &[Op], phase_duration: Duration) -> Self {
        let duration_ms = phase_duration.as_millis() as u64;
        let during = ops.iter().map(|op| (*op, Expectation::Fail)).collect();

        Scenario {
            phases: vec![
                Phase {
                    name: "before-chaos".to_string(),
                    duration_ms,
                    expectations: HashMap::new(),
                    fault: Some(FaultPlan::healthy()),
                },
                Phase {
                    name: "during-chaos".to_string(),
                    duration_ms,
                    expectations: during,
                    fault: Some(FaultPlan::unavailable()),
                },
                Phase {
                    name: "after-recovery".to_string(),
                    duration_ms,
                    expectations: HashMap::new(),
                    fault: Some(FaultPlan::healthy()),
                },
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self, ChaosError> {
        let scenario: Scenario = read_json(path)?;
        if scenario.phases.is_empty() {
            return Err(ChaosError::Config(
                "scenario must have at least one phase".to_string(),
            ));
        }
        Ok(scenario)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct PhaseOutcome {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub report: StatisticReport,
    pub tallies: BTreeMap<Op, Tally>,
}

impl PhaseOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct ScenarioReport {
    pub phases: Vec<PhaseOutcome>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.phases.iter().all(PhaseOutcome::passed)
    }

    /// `Ok` when every phase met its expectations.
    pub fn into_result(self) -> Result<Self, ChaosError> {
        let violations = self
            .phases
            .iter()
            .flat_map(|phase| phase.report.violations())
            .collect::<Vec<_>>();

        if violations.is_empty() {
            Ok(self)
        } else {
            Err(ChaosError::Expectations(violations))
        }
    }
}

/// Live view of a run, shared with the status endpoint.
#[derive(Default)]
pub struct RunState {
    pub phase: RwLock<Option<String>>,
    pub counters: RwLock<BTreeMap<Op, Arc<Counters>>>,
    pub finished: RwLock<Vec<PhaseOutcome>>,
}

pub struct ScenarioRunner {
    pub client: Arc<dyn VectorClient>,
    pub injector: Option<Arc<dyn FaultInjector>>,
    pub config: Arc<ChaosConfig>,
    pub ops: Vec<Op>,
    pub p9: usize,
    pub show_progress: bool,
    pub state: Arc<RunState>,
    pub logger: Logger,
}

impl ScenarioRunner {
    pub fn new(client: Arc<dyn VectorClient>, config: Arc<ChaosConfig>, logger: Logger) -> Self {
        ScenarioRunner {
            client,
            injector: None,
            config,
            ops: Op::CHECKED.to_vec(),
            p9: 2,
            show_progress: false,
            state: Arc::new(RunState::default()),
            logger,
        }
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds {
            succ: self.config.succ_threshold,
            fail: self.config.fail_threshold,
            min_samples: self.config.min_samples,
        }
    }

    async fn wait(&self, phase: &Phase) {
        if !self.show_progress || phase.duration_ms == 0 {
            tokio::time::sleep(phase.duration()).await;
            return;
        }

        let ticks = phase.duration_ms.div_ceil(100).max(1);
        let pb = ProgressBar::new(ticks);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{elapsed_precise}] {wide_bar} (eta:{eta})")
        {
            pb.set_style(style);
        }
        pb.set_message(phase.name.clone());

        let mut interval = tokio::time::interval(phase.duration() / ticks as u32);
        interval.tick().await;
        for _ in 0..ticks {
            interval.tick().await;
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    /// Runs every phase in order. Checkers are stopped and faults cleared on return.
    pub async fn run(&self, scenario: &Scenario) -> Result<ScenarioReport, ChaosError> {
        if let Some(injector) = &self.injector {
            injector.clear();
        }

        let checkers = CheckerSet::start(
            self.client.clone(),
            self.config.clone(),
            &self.ops,
            self.logger.clone(),
        )
        .await?;
        *self.state.counters.write().await = checkers.counters();

        let mut report = ScenarioReport::default();

        for phase in &scenario.phases {
            let logger = self.logger.new(o!("phase" => phase.name.clone()));

            match (&self.injector, &phase.fault) {
                (Some(injector), Some(plan)) => {
                    info!(logger, "Applying fault plan"; "plan" => format!("{plan:?}"));
                    injector.inject(plan.clone());
                }
                (None, Some(plan)) if !plan.is_healthy() => {
                    warn!(logger, "Target cannot inject faults; inject them externally now");
                }
                _ => {}
            }

            *self.state.phase.write().await = Some(phase.name.clone());
            let started_at = Utc::now();
            checkers.reset();

            info!(logger, "Phase started"; "duration_ms" => phase.duration_ms);
            self.wait(phase).await;

            let tallies = checkers.tallies();
            let phase_report = evaluate(&tallies, &phase.expectations, &self.thresholds(), &logger);
            log_latencies(&tallies, self.p9, &logger);

            if phase_report.passed() {
                info!(logger, "Phase passed");
            } else {
                for violation in phase_report.violations() {
                    warn!(logger, "{violation}");
                }
            }

            let outcome = PhaseOutcome {
                name: phase.name.clone(),
                started_at,
                report: phase_report,
                tallies,
            };
            self.state.finished.write().await.push(outcome.clone());
            report.phases.push(outcome);
        }

        if let Some(injector) = &self.injector {
            injector.clear();
        }
        checkers.stop().await;
        *self.state.phase.write().await = None;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_scenario() {
        let scenario = Scenario::default_for(&[Op::Search, Op::Insert], Duration::from_secs(2));
        assert_eq!(scenario.phases.len(), 3);
        assert!(scenario.phases[0].expectations.is_empty());
        assert_eq!(
            scenario.phases[1].expectations.get(&Op::Search),
            Some(&Expectation::Fail)
        );
        assert_eq!(scenario.phases[1].fault, Some(FaultPlan::unavailable()));
        assert_eq!(scenario.phases[2].duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_scenario() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{ "phases": [
                { "name": "kill-querynode", "duration_ms": 500,
                  "expectations": { "search": "fail", "query": "fail" },
                  "fault": { "error_rate": 0.5 } }
            ] }"#,
        )
        .unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        let phase = &scenario.phases[0];
        assert_eq!(phase.expectations.len(), 2);
        assert_eq!(phase.expectations[&Op::Query], Expectation::Fail);
        assert_eq!(phase.fault.as_ref().unwrap().error_rate, 0.5);
        assert!(!phase.fault.as_ref().unwrap().unavailable);
    }

    #[test]
    fn test_load_rejects_empty_scenario() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{ "phases": [] }"#).unwrap();
        assert!(Scenario::load(file.path()).is_err());
    }
}
