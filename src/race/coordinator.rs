//! Race coordinator: run a decider and a dependent concurrently and let the
//! decider's result decide whether the dependent may finish.
//!
//! The run proceeds through at most three suspension points:
//! 1. wait for the first of the two operations to terminate
//! 2. wait for a cancellation acknowledgment (decision was "stop")
//! 3. wait for the remaining operation (decision was "continue", or the
//!    dependent finished first)
//!
//! Both operations are terminal whenever [`RaceCoordinator::run`] returns,
//! unless a configured cancellation timeout expires.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::RaceConfig;
use crate::race::operation::{Operation, Termination};
use crate::race::outcome::{CoordinatorError, RaceOutcome};

/// Which operation was observed terminal first.
enum First<A, B> {
    Decider(Termination<A>),
    Dependent(Termination<B>),
}

/// Stateless coordinator. Holds only configuration, so one instance can
/// serve any number of concurrent runs.
#[derive(Debug, Clone, Default)]
pub struct RaceCoordinator {
    cancel_timeout: Option<Duration>,
}

/// Builder for [`RaceCoordinator`].
#[derive(Debug, Clone, Default)]
pub struct RaceCoordinatorBuilder {
    cancel_timeout: Option<Duration>,
}

impl RaceCoordinatorBuilder {
    /// Bound the wait for a cancellation acknowledgment.
    pub fn cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RaceCoordinator {
        RaceCoordinator {
            cancel_timeout: self.cancel_timeout,
        }
    }
}

impl RaceCoordinator {
    /// A coordinator that waits indefinitely for cancellation acknowledgments.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RaceCoordinatorBuilder {
        RaceCoordinatorBuilder::default()
    }

    /// Build from the `race` section of the service configuration.
    pub fn from_config(config: &RaceConfig) -> Self {
        let mut builder = Self::builder();
        if let Some(ms) = config.cancel_timeout_ms {
            builder = builder.cancel_timeout(Duration::from_millis(ms));
        }
        builder.build()
    }

    pub fn cancel_timeout(&self) -> Option<Duration> {
        self.cancel_timeout
    }

    /// Race `decider` against `dependent`.
    ///
    /// `predicate` is evaluated exactly once, on the decider's value, before
    /// any cancellation request is issued. `false` cancels the dependent if it
    /// is still running.
    ///
    /// If the dependent finishes first the decider is still awaited and the
    /// predicate still evaluated; a `false` decision is then reported as
    /// [`DependentFate::CancellationRaceLost`](crate::race::outcome::DependentFate)
    /// with the dependent's value retained.
    ///
    /// A failure of either operation cancels the other and is returned once
    /// the other has settled.
    pub async fn run<A, B, P>(
        &self,
        mut decider: Operation<A>,
        mut dependent: Operation<B>,
        predicate: P,
    ) -> Result<RaceOutcome<A, B>, CoordinatorError>
    where
        A: Send + 'static,
        B: Send + 'static,
        P: FnOnce(&A) -> bool,
    {
        info!(
            decider = decider.name(),
            dependent = dependent.name(),
            "Starting race"
        );

        // Checked before either starts, so a rejected run leaves nothing running.
        decider.ensure_joinable()?;
        dependent.ensure_joinable()?;

        decider.start();
        dependent.start();

        // Decider is polled first so that a tie counts as the decider finishing first.
        let first = tokio::select! {
            biased;
            termination = decider.join() => First::Decider(termination?),
            termination = dependent.join() => First::Dependent(termination?),
        };

        let outcome = match first {
            First::Decider(Termination::Completed(value)) => {
                let proceed = predicate(&value);
                debug!(proceed, "Decider finished first");
                if proceed {
                    self.await_dependent(value, &mut dependent).await
                } else {
                    self.cancel_dependent(value, &mut dependent).await
                }
            }
            First::Decider(Termination::Failed(source)) => {
                self.settle_sibling(&mut dependent).await;
                Err(CoordinatorError::DeciderFailed {
                    name: decider.name().to_owned(),
                    source,
                })
            }
            First::Decider(Termination::Cancelled) => {
                self.settle_sibling(&mut dependent).await;
                Err(CoordinatorError::DeciderFailed {
                    name: decider.name().to_owned(),
                    source: anyhow::anyhow!("cancelled before reaching a decision"),
                })
            }
            First::Dependent(Termination::Failed(source)) => {
                self.settle_sibling(&mut decider).await;
                Err(CoordinatorError::DependentFailed {
                    name: dependent.name().to_owned(),
                    source,
                })
            }
            First::Dependent(early) => {
                debug!(state = %early.state(), "Dependent finished first");
                let value = Self::await_decider(&mut decider).await?;
                let proceed = predicate(&value);
                Ok(match early {
                    Termination::Completed(result) if proceed => {
                        RaceOutcome::completed(value, result)
                    }
                    Termination::Completed(result) => RaceOutcome::race_lost(value, result),
                    _ => RaceOutcome::cancelled(value),
                })
            }
        };

        match &outcome {
            Ok(outcome) => info!(
                fate = %outcome.fate,
                cancelled = outcome.cancelled,
                decider_state = %decider.state(),
                dependent_state = %dependent.state(),
                "Race finished"
            ),
            Err(err) => warn!(
                kind = err.kind(),
                error = %err,
                decider_state = %decider.state(),
                dependent_state = %dependent.state(),
                "Race failed"
            ),
        }

        outcome
    }

    /// Decision was "continue": wait for the dependent to finish on its own.
    async fn await_dependent<A, B: Send + 'static>(
        &self,
        value: A,
        dependent: &mut Operation<B>,
    ) -> Result<RaceOutcome<A, B>, CoordinatorError> {
        match dependent.join().await? {
            Termination::Completed(result) => Ok(RaceOutcome::completed(value, result)),
            Termination::Cancelled => Ok(RaceOutcome::cancelled(value)),
            Termination::Failed(source) => Err(CoordinatorError::DependentFailed {
                name: dependent.name().to_owned(),
                source,
            }),
        }
    }

    /// Decision was "stop": cancel the dependent and wait for it to settle.
    async fn cancel_dependent<A, B: Send + 'static>(
        &self,
        value: A,
        dependent: &mut Operation<B>,
    ) -> Result<RaceOutcome<A, B>, CoordinatorError> {
        match self.cancel_and_wait(dependent).await? {
            Termination::Cancelled => Ok(RaceOutcome::cancelled(value)),
            Termination::Completed(result) => {
                debug!(operation = dependent.name(), "Completed before observing cancellation");
                Ok(RaceOutcome::race_lost(value, result))
            }
            Termination::Failed(source) => Err(CoordinatorError::DependentFailed {
                name: dependent.name().to_owned(),
                source,
            }),
        }
    }

    /// The dependent already finished; the decider runs to its natural end.
    async fn await_decider<A: Send + 'static>(
        decider: &mut Operation<A>,
    ) -> Result<A, CoordinatorError> {
        match decider.join().await? {
            Termination::Completed(value) => Ok(value),
            Termination::Failed(source) => Err(CoordinatorError::DeciderFailed {
                name: decider.name().to_owned(),
                source,
            }),
            Termination::Cancelled => Err(CoordinatorError::DeciderFailed {
                name: decider.name().to_owned(),
                source: anyhow::anyhow!("cancelled before reaching a decision"),
            }),
        }
    }

    /// Cancel `op` and wait for its terminal state, bounded by the timeout.
    async fn cancel_and_wait<T: Send + 'static>(
        &self,
        op: &mut Operation<T>,
    ) -> Result<Termination<T>, CoordinatorError> {
        op.cancel();

        let termination = match self.cancel_timeout {
            Some(limit) => {
                let joined = tokio::time::timeout(limit, op.join()).await;
                match joined {
                    Ok(termination) => termination?,
                    Err(_) => {
                        return Err(CoordinatorError::CancellationTimeout {
                            name: op.name().to_owned(),
                            timeout: limit,
                        })
                    }
                }
            }
            None => op.join().await?,
        };

        Ok(termination)
    }

    /// Cancel the sibling of a failed operation before the failure surfaces.
    /// Whatever the sibling ends with is discarded.
    async fn settle_sibling<T: Send + 'static>(&self, op: &mut Operation<T>) {
        match self.cancel_and_wait(op).await {
            Ok(termination) => {
                debug!(operation = op.name(), state = %termination.state(), "Sibling settled")
            }
            Err(err) => warn!(operation = op.name(), error = %err, "Sibling did not settle"),
        }
    }
}
