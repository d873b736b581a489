//! Task supervisor
//!
//! Drives one bridge run over an already open session:
//!
//! ```text
//! Idle ─► Running ─► Draining ─► Closed
//!           │
//!           ├─ subscribe every response topic (acknowledged)
//!           ├─ spawn one listener per device
//!           ├─ spawn the dispatcher
//!           └─ wait for all tasks, or for the external shutdown future
//! ```
//!
//! Draining cancels whatever is still running, waits out the grace period,
//! then releases the subscriptions and closes the session. Nothing outlives
//! the session.

mod group;
pub mod shutdown;

pub use group::{TaskGroup, TaskRecord, TaskStatus};

use crate::command::{CommandDispatcher, DispatchPlan, PendingCommands};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, CancellationFailure};
use crate::listener::{ListenSummary, ResponseListener};
use crate::session::Session;
use cmdbridge_shared::Device;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// What a supervised task produced
#[derive(Debug)]
pub enum TaskOutput {
    Listener(ListenSummary),
    Dispatcher(Vec<String>),
}

/// A task that ended in failure
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: BridgeError,
}

/// Outcome of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Listeners that reached their response count
    pub listeners: Vec<ListenSummary>,
    /// Correlation ids published, in publish order
    pub dispatched: Vec<String>,
    pub failures: Vec<TaskFailure>,
    pub cancellation_failures: Vec<CancellationFailure>,
    /// The run was cut short by the shutdown future
    pub interrupted: bool,
}

impl RunReport {
    /// First failure that is fatal to the run
    pub fn fatal_error(&self) -> Option<&BridgeError> {
        self.failures
            .iter()
            .map(|failure| &failure.error)
            .find(|error| error.is_fatal())
    }

    /// Every task completed and teardown was clean
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.cancellation_failures.is_empty() && !self.interrupted
    }
}

pub struct TaskSupervisor {
    grace_period: Duration,
    response_timeout: Option<Duration>,
    state: watch::Sender<SupervisorState>,
}

impl TaskSupervisor {
    pub fn new(config: &BridgeConfig) -> Self {
        let (state, _) = watch::channel(SupervisorState::Idle);
        Self {
            grace_period: config.grace_period,
            response_timeout: config.response_timeout,
            state,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Follow state changes
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SupervisorState) {
        let previous = self.state.send_replace(next);
        info!(from = ?previous, to = ?next, "Supervisor state");
    }

    /// Run listeners for `devices` and the dispatcher for `plan`
    ///
    /// Each listener stops after `stop_after` responses. The session is closed
    /// before this returns, whatever happened.
    pub async fn run<S>(
        self,
        session: Session,
        devices: &[Device],
        plan: DispatchPlan,
        stop_after: usize,
        shutdown: S,
    ) -> RunReport
    where
        S: Future<Output = ()>,
    {
        let mut report = RunReport::default();
        let mut group: TaskGroup<TaskOutput> = TaskGroup::new();
        let pending = PendingCommands::new();
        let handle = session.handle();
        tokio::pin!(shutdown);

        self.transition(SupervisorState::Running);

        let mut subscriptions = Vec::with_capacity(devices.len());
        let mut subscribed = true;
        for device in devices {
            let topic = device.response_topic();
            let subscribe = tokio::select! {
                result = handle.subscribe(topic) => result,
                _ = &mut shutdown => {
                    report.interrupted = true;
                    subscribed = false;
                    break;
                }
            };
            match subscribe {
                Ok(subscription) => subscriptions.push((device.clone(), subscription)),
                Err(e) => {
                    error!(device = %device, error = %e, "Failed to subscribe response topic");
                    report.failures.push(TaskFailure {
                        task: format!("subscribe:{}", device.id()),
                        error: e.into(),
                    });
                    subscribed = false;
                    break;
                }
            }
        }

        if subscribed {
            for (device, subscription) in subscriptions {
                let mut listener = ResponseListener::new(device.clone(), subscription, stop_after)
                    .with_correlation(pending.clone());
                if let Some(timeout) = self.response_timeout {
                    listener = listener.with_timeout(timeout);
                }
                group.spawn(format!("listener:{}", device.id()), move |token| async move {
                    listener.listen(token).await.map(TaskOutput::Listener)
                });
            }

            let dispatcher = CommandDispatcher::new(handle.clone(), pending.clone());
            group.spawn("dispatcher", move |token| async move {
                tokio::select! {
                    _ = token.cancelled() => Err(BridgeError::Cancelled),
                    issued = dispatcher.dispatch(plan) => issued.map(TaskOutput::Dispatcher),
                }
            });

            tokio::select! {
                _ = group.join() => {}
                _ = &mut shutdown => {
                    warn!("Shutdown requested, cancelling outstanding tasks");
                    report.interrupted = true;
                }
            }
        }

        self.transition(SupervisorState::Draining);
        report.cancellation_failures = group.shutdown(self.grace_period).await;

        for record in group.take_finished() {
            match record.result {
                Ok(TaskOutput::Listener(summary)) => report.listeners.push(summary),
                Ok(TaskOutput::Dispatcher(issued)) => report.dispatched = issued,
                // Only the group cancels, and it says why elsewhere in the report
                Err(BridgeError::Cancelled) => {}
                Err(error) => report.failures.push(TaskFailure {
                    task: record.name,
                    error,
                }),
            }
        }

        // Listeners have stopped; only now let go of their subscriptions
        for device in devices {
            if let Err(e) = session.release(device.response_topic()).await {
                warn!(device = %device, error = %e, "Failed to release response subscription");
            }
        }
        if let Err(e) = session.close().await {
            error!(error = %e, "Failed to close session");
            report.failures.push(TaskFailure {
                task: "session".into(),
                error: e.into(),
            });
        }

        let outstanding = pending.len().await;
        if outstanding > 0 {
            info!(outstanding, "Commands left without a response");
        }

        self.transition(SupervisorState::Closed);
        info!(
            listeners = report.listeners.len(),
            dispatched = report.dispatched.len(),
            failures = report.failures.len(),
            interrupted = report.interrupted,
            "Run finished"
        );
        report
    }
}
