//! Functional case catalogues that run against any [`VectorClient`].

pub mod has_collection;

use crate::{client::VectorClient, error::ChaosError};
use serde::{Deserialize, Serialize};
use slog::{error, info, Logger};
use std::{fmt, sync::Arc};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaseLabel {
    Smoke,
    L2,
}

impl fmt::Display for CaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseLabel::Smoke => f.write_str("smoke"),
            CaseLabel::L2 => f.write_str("L2"),
        }
    }
}

/// Connected and disconnected clients pointing at the same target.
pub struct Fixtures {
    pub connect: Arc<dyn VectorClient>,
    pub dis_connect: Arc<dyn VectorClient>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CaseOutcome {
    pub name: String,
    pub label: CaseLabel,
    pub error: Option<String>,
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<CaseOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(CaseOutcome::passed)
    }

    pub fn failed(&self) -> Vec<&CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed()).collect()
    }
}

/// Fails the enclosing case with `reason` unless `condition` holds.
pub(crate) fn ensure(
    case: &str,
    condition: bool,
    reason: impl Into<String>,
) -> Result<(), ChaosError> {
    if condition {
        Ok(())
    } else {
        Err(ChaosError::Case {
            case: case.to_string(),
            reason: reason.into(),
        })
    }
}

/// Runs every case of the `has_collection` suite whose label is in `labels`
/// (all cases when `labels` is empty).
pub async fn run_has_collection(
    fixtures: &Fixtures,
    labels: &[CaseLabel],
    logger: &Logger,
) -> SuiteReport {
    let mut report = SuiteReport::default();

    for case in has_collection::HasCollectionCase::ALL {
        if !labels.is_empty() && !labels.contains(&case.label()) {
            continue;
        }

        let outcome = case.run(fixtures).await;
        match &outcome {
            Ok(()) => info!(logger, "PASSED {}", case.name(); "label" => %case.label()),
            Err(e) => error!(logger, "FAILED {}: {e}", case.name(); "label" => %case.label()),
        }

        report.outcomes.push(CaseOutcome {
            name: case.name().to_string(),
            label: case.label(),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    report
}
