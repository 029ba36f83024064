//! Cancellable units of concurrent work.
//!
//! An [`Operation`] wraps a future and tracks its lifecycle:
//!   Pending → Running → {Completed | Failed | Cancelled}
//!
//! Cancellation is cooperative. [`Operation::cancel`] only issues a request;
//! the work acknowledges it by returning the [`Cancelled`] error. Any other
//! error is a failure, even one raised while stopping. The first terminal
//! transition that gets recorded wins, so an operation that finishes
//! naturally before it observes the request stays `Completed`.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle state of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Created but not yet started.
    Pending,
    /// Spawned onto the runtime.
    Running,
    /// Produced a value.
    Completed,
    /// Produced an error (or panicked).
    Failed,
    /// Acknowledged a cancellation request.
    Cancelled,
}

impl OperationState {
    /// Whether the state is one of Completed, Failed or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Running => write!(f, "running"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Returned by work to acknowledge a cancellation request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("cancellation acknowledged")]
pub struct Cancelled;

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("operation `{0}` was never started")]
    NotStarted(String),

    #[error("operation `{0}` was already joined")]
    AlreadyJoined(String),
}

/// How an operation reached its terminal state.
#[derive(Debug)]
pub enum Termination<T> {
    Completed(T),
    Failed(anyhow::Error),
    Cancelled,
}

impl<T> Termination<T> {
    /// The terminal [`OperationState`] this termination corresponds to.
    pub fn state(&self) -> OperationState {
        match self {
            Termination::Completed(_) => OperationState::Completed,
            Termination::Failed(_) => OperationState::Failed,
            Termination::Cancelled => OperationState::Cancelled,
        }
    }
}

/// Records `to` if it is a legal transition from the current state.
fn transition(state: &watch::Sender<OperationState>, to: OperationState) -> bool {
    state.send_if_modified(|current| {
        let allowed = match (*current, to) {
            (OperationState::Pending, OperationState::Running) => true,
            (OperationState::Running, next) => next.is_terminal(),
            _ => false,
        };
        if allowed {
            *current = to;
        }
        allowed
    })
}

/// Lives inside the spawned task. If the task is dropped by the runtime
/// before it records a terminal state (abort, shutdown, panic), this settles it.
struct SettleOnDrop(Arc<watch::Sender<OperationState>>);

impl Drop for SettleOnDrop {
    fn drop(&mut self) {
        let to = if std::thread::panicking() {
            OperationState::Failed
        } else {
            OperationState::Cancelled
        };
        transition(&self.0, to);
    }
}

/// A read-only view of an operation's state that outlives the operation.
#[derive(Debug, Clone)]
pub struct StateWatch {
    rx: watch::Receiver<OperationState>,
}

impl StateWatch {
    /// The most recently recorded state.
    pub fn current(&self) -> OperationState {
        *self.rx.borrow()
    }

    /// Wait until the operation reaches a terminal state.
    pub async fn terminated(&mut self) -> OperationState {
        let settled = self
            .rx
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        settled.unwrap_or_else(|_| *self.rx.borrow())
    }
}

/// A named unit of concurrent work with a cooperative cancellation handle.
pub struct Operation<T> {
    name: String,
    token: CancellationToken,
    state: Arc<watch::Sender<OperationState>>,
    work: Option<BoxFuture<'static, anyhow::Result<T>>>,
    handle: Option<JoinHandle<Termination<T>>>,
}

impl<T: Send + 'static> Operation<T> {
    /// Wrap a plain future.
    ///
    /// A cancellation request is acknowledged at the future's next suspension
    /// point: it is dropped there, releasing whatever it holds, and the
    /// operation ends with [`Cancelled`].
    pub fn new<F>(name: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_cancellation(name, move |token| async move {
            tokio::select! {
                biased;
                result = work => result,
                _ = token.cancelled() => Err(Cancelled.into()),
            }
        })
    }

    /// Build the work from a cancellation token the work observes itself.
    ///
    /// The work acknowledges a request by returning [`Cancelled`]. Returning
    /// `Ok` means it completed before it noticed; any other error is a
    /// failure whether or not cancellation was requested.
    pub fn with_cancellation<F, Fut>(name: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (state, _) = watch::channel(OperationState::Pending);
        Self {
            name: name.into(),
            work: Some(work(token.clone()).boxed()),
            token,
            state: Arc::new(state),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    /// Detach a view of the state that remains valid after the operation is dropped.
    pub fn watch(&self) -> StateWatch {
        StateWatch {
            rx: self.state.subscribe(),
        }
    }

    /// Whether a cancellation request has been issued.
    pub fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn the work onto the current tokio runtime. No-op unless Pending.
    pub fn start(&mut self) {
        let Some(work) = self.work.take() else {
            return;
        };

        transition(&self.state, OperationState::Running);

        let token = self.token.clone();
        let state = self.state.clone();
        let name = self.name.clone();
        // Captured by the task so it also fires if the task is dropped unpolled.
        let guard = SettleOnDrop(self.state.clone());

        self.handle = Some(tokio::spawn(async move {
            let termination = match work.await {
                Ok(value) => Termination::Completed(value),
                Err(err) if err.is::<Cancelled>() => {
                    debug!(
                        operation = %name,
                        requested = token.is_cancelled(),
                        "Cancellation acknowledged"
                    );
                    Termination::Cancelled
                }
                Err(err) => {
                    if token.is_cancelled() {
                        warn!(operation = %name, error = %err, "Failed while cancelling");
                    }
                    Termination::Failed(err)
                }
            };

            transition(&state, termination.state());
            drop(guard);

            debug!(operation = %name, state = %termination.state(), "Operation finished");
            termination
        }));

        debug!(operation = %self.name, "Operation started");
    }

    /// Request cancellation.
    ///
    /// Only a running operation can be cancelled; on a pending or terminal
    /// one this does nothing and returns `false`. Repeated requests have the
    /// same effect as a single one.
    pub fn cancel(&self) -> bool {
        if self.state() != OperationState::Running {
            return false;
        }
        if !self.token.is_cancelled() {
            debug!(operation = %self.name, "Cancellation requested");
            self.token.cancel();
        }
        true
    }

    /// Fails if an earlier [`join`](Self::join) already took the result.
    pub(crate) fn ensure_joinable(&self) -> Result<(), OperationError> {
        if self.work.is_none() && self.handle.is_none() {
            return Err(OperationError::AlreadyJoined(self.name.clone()));
        }
        Ok(())
    }

    /// Wait for the operation to reach a terminal state and take its result.
    ///
    /// Cancel-safe: dropping the returned future before it resolves leaves
    /// the operation joinable.
    pub async fn join(&mut self) -> Result<Termination<T>, OperationError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(if self.work.is_some() {
                OperationError::NotStarted(self.name.clone())
            } else {
                OperationError::AlreadyJoined(self.name.clone())
            });
        };

        let joined = handle.await;
        self.handle = None;

        let termination = match joined {
            Ok(termination) => termination,
            Err(err) if err.is_panic() => {
                warn!(operation = %self.name, "Operation panicked");
                Termination::Failed(anyhow::anyhow!("operation `{}` panicked", self.name))
            }
            Err(_) => Termination::Cancelled,
        };

        transition(&self.state, termination.state());
        Ok(termination)
    }
}

impl<T> std::fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .field("cancel_requested", &self.token.is_cancelled())
            .finish()
    }
}

impl<T> Drop for Operation<T> {
    fn drop(&mut self) {
        // An abandoned operation must not keep running unobserved.
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                self.token.cancel();
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lifecycle_completed() {
        let mut op = Operation::new("quick", async { Ok(7) });
        assert_eq!(op.state(), OperationState::Pending);

        op.start();
        assert!(matches!(
            op.state(),
            OperationState::Running | OperationState::Completed
        ));

        let termination = op.join().await.unwrap();
        assert!(matches!(termination, Termination::Completed(7)));
        assert_eq!(op.state(), OperationState::Completed);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let mut op: Operation<()> = Operation::new("broken", async { Err(anyhow::anyhow!("boom")) });
        op.start();

        match op.join().await.unwrap() {
            Termination::Failed(err) => assert_eq!(err.to_string(), "boom"),
            other => panic!("expected failure, got {:?}", other.state()),
        }
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let mut op = Operation::new("slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("done")
        });
        op.start();

        assert!(op.cancel());
        assert!(op.cancel());
        assert!(op.cancel_requested());

        assert!(matches!(op.join().await.unwrap(), Termination::Cancelled));
        assert_eq!(op.state(), OperationState::Cancelled);

        // Terminal now, so further requests are ignored.
        assert!(!op.cancel());
        assert_eq!(op.state(), OperationState::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_pending_is_noop() {
        let op = Operation::new("idle", async { Ok(()) });
        assert!(!op.cancel());
        assert!(!op.cancel_requested());
        assert_eq!(op.state(), OperationState::Pending);
    }

    #[tokio::test]
    async fn test_natural_completion_beats_late_cancel() {
        let mut op = Operation::with_cancellation("stubborn", |_token| async {
            // Never looks at the token.
            tokio::task::yield_now().await;
            Ok(42)
        });
        op.start();
        op.cancel();

        assert!(matches!(op.join().await.unwrap(), Termination::Completed(42)));
        assert_eq!(op.state(), OperationState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooperative_acknowledgment() {
        let mut op = Operation::with_cancellation("polite", |token| async move {
            tokio::select! {
                _ = token.cancelled() => Err(Cancelled.into()),
                _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(1),
            }
        });
        op.start();
        op.cancel();

        assert!(matches!(op.join().await.unwrap(), Termination::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_while_cancelling_is_failure() {
        let mut op: Operation<u32> = Operation::with_cancellation("leaky", |token| async move {
            token.cancelled().await;
            Err(anyhow::anyhow!("could not release lock"))
        });
        op.start();
        op.cancel();

        match op.join().await.unwrap() {
            Termination::Failed(err) => assert_eq!(err.to_string(), "could not release lock"),
            other => panic!("expected failure, got {:?}", other.state()),
        }
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test]
    async fn test_wrapped_acknowledgment_is_recognised() {
        let mut op: Operation<()> = Operation::with_cancellation("context", |token| async move {
            token.cancelled().await;
            Err(anyhow::Error::from(Cancelled).context("stopping upload"))
        });
        op.start();
        op.cancel();

        assert!(matches!(op.join().await.unwrap(), Termination::Cancelled));
    }

    #[tokio::test]
    async fn test_join_misuse() {
        let mut op = Operation::new("once", async { Ok(()) });
        assert!(matches!(op.join().await, Err(OperationError::NotStarted(_))));

        op.start();
        op.join().await.unwrap();
        assert!(matches!(op.join().await, Err(OperationError::AlreadyJoined(_))));
    }

    #[tokio::test]
    async fn test_panic_is_failure() {
        let mut op: Operation<()> = Operation::new("panicky", async {
            if true {
                panic!("oops");
            }
            Ok(())
        });
        op.start();

        assert!(matches!(op.join().await.unwrap(), Termination::Failed(_)));
        assert_eq!(op.state(), OperationState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_settles_running_operation() {
        let mut op = Operation::new("abandoned", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        op.start();
        let mut watch = op.watch();
        drop(op);

        assert_eq!(watch.terminated().await, OperationState::Cancelled);
    }
}
