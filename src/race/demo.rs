//! Timed demo operations.
//!
//! The decider sleeps briefly and returns `(proceed, "data")`; the dependent
//! is slower and returns a string unless it gets cancelled first.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::config::RaceConfig;
use crate::race::coordinator::RaceCoordinator;
use crate::race::operation::Operation;
use crate::race::outcome::{CoordinatorError, DependentFate, RaceOutcome};

pub const DEPENDENT_RESULT: &str = "Task 2 Data";

/// Decider value: whether the dependent should continue, plus a payload.
pub type Decision = (bool, String);

/// Serializable summary of a demo race.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub proceed: bool,
    pub data: String,
    pub dependent: Option<String>,
    pub cancelled: bool,
    pub fate: DependentFate,
    pub elapsed_ms: u64,
}

impl DemoReport {
    fn new(outcome: RaceOutcome<Decision, String>, elapsed: Duration) -> Self {
        let RaceOutcome {
            decider: (proceed, data),
            dependent,
            cancelled,
            fate,
        } = outcome;
        Self {
            proceed,
            data,
            dependent,
            cancelled,
            fate,
            elapsed_ms: saturating_millis(elapsed),
        }
    }
}

fn saturating_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// The second gather task takes twice the first one's delay.
fn gather_delays(config: &RaceConfig) -> (Duration, Duration) {
    (
        Duration::from_millis(config.decider_delay_ms),
        Duration::from_millis(config.decider_delay_ms.saturating_mul(2)),
    )
}

/// The decider operation: waits `delay`, then decides.
pub fn decider(proceed: bool, delay: Duration) -> Operation<Decision> {
    Operation::new("decider", async move {
        tokio::time::sleep(delay).await;
        Ok((proceed, "data".to_string()))
    })
}

/// The dependent operation: waits `delay`, then returns [`DEPENDENT_RESULT`].
pub fn dependent(delay: Duration) -> Operation<String> {
    Operation::new("dependent", async move {
        tokio::time::sleep(delay).await;
        Ok(DEPENDENT_RESULT.to_string())
    })
}

/// Run one race with the demo operations.
pub async fn run_race_demo(
    coordinator: &RaceCoordinator,
    config: &RaceConfig,
    proceed: bool,
) -> Result<DemoReport, CoordinatorError> {
    let start = Instant::now();
    let outcome = coordinator
        .run(
            decider(proceed, Duration::from_millis(config.decider_delay_ms)),
            dependent(Duration::from_millis(config.dependent_delay_ms)),
            |(proceed, _): &Decision| *proceed,
        )
        .await?;

    let report = DemoReport::new(outcome, start.elapsed());
    info!(
        proceed = report.proceed,
        fate = %report.fate,
        elapsed_ms = report.elapsed_ms,
        "Race demo complete"
    );
    Ok(report)
}

/// Run two timed tasks to completion concurrently and collect both results.
pub async fn run_gather_demo(config: &RaceConfig) -> Vec<String> {
    let (first, second) = gather_delays(config);
    let one = async {
        tokio::time::sleep(first).await;
        "Task one completed".to_string()
    };
    let two = async {
        tokio::time::sleep(second).await;
        "Task two completed".to_string()
    };

    let (one, two) = tokio::join!(one, two);
    vec![one, two]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_delays_saturate() {
        let config = RaceConfig {
            decider_delay_ms: u64::MAX - 1,
            ..RaceConfig::default()
        };
        let (first, second) = gather_delays(&config);
        assert_eq!(first, Duration::from_millis(u64::MAX - 1));
        assert_eq!(second, Duration::from_millis(u64::MAX));

        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
        assert_eq!(saturating_millis(Duration::from_millis(1500)), 1500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_demo_proceeds() {
        let report = run_race_demo(&RaceCoordinator::new(), &RaceConfig::default(), true)
            .await
            .unwrap();
        assert_eq!(report.dependent.as_deref(), Some(DEPENDENT_RESULT));
        assert!(!report.cancelled);
        assert_eq!(report.data, "data");
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_demo_cancels() {
        let config = RaceConfig::default();
        let report = run_race_demo(&RaceCoordinator::new(), &config, false)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.fate, DependentFate::Cancelled);
        assert!(report.elapsed_ms < config.dependent_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gather_demo_runs_concurrently() {
        let config = RaceConfig::default();
        let start = tokio::time::Instant::now();
        let results = run_gather_demo(&config).await;
        assert_eq!(results, vec!["Task one completed", "Task two completed"]);
        // Sequential execution would take three delay units.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(config.decider_delay_ms * 2));
        assert!(elapsed < Duration::from_millis(config.decider_delay_ms * 3));
    }
}
