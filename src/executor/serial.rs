//! Single-context task runner owning one piece of state.
//!
//! Every mutation of the owned state happens inside a task run by this
//! executor, one task at a time, so the state itself needs no locks. Tasks
//! can be submitted from any thread; high-priority tasks jump ahead of every
//! normal task that has not started yet.

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, trace, Instrument};

use crate::error::ExecutorClosed;

/// Unit of work run against the executor-owned state.
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Envelope<S> {
    Run(Task<S>),
    Shutdown,
}

/// Cloneable submission side of a [`SerialExecutor`].
pub struct ExecutorHandle<S> {
    normal: flume::Sender<Envelope<S>>,
    high: flume::Sender<Envelope<S>>,
}

impl<S> Clone for ExecutorHandle<S> {
    fn clone(&self) -> Self {
        Self {
            normal: self.normal.clone(),
            high: self.high.clone(),
        }
    }
}

impl<S: Send + 'static> ExecutorHandle<S> {
    /// Queues `task` after everything submitted so far.
    pub fn submit<F>(&self, task: F) -> Result<(), ExecutorClosed>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.normal
            .send(Envelope::Run(Box::new(task)))
            .map_err(|_| ExecutorClosed)
    }

    /// Queues `task` ahead of every normal task that has not started yet.
    pub fn submit_with_high_priority<F>(&self, task: F) -> Result<(), ExecutorClosed>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.high
            .send(Envelope::Run(Box::new(task)))
            .map_err(|_| ExecutorClosed)
    }

    /// Runs `f` on the executor and waits for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, ExecutorClosed>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move |state| {
            let _ = tx.send(f(state));
        })?;
        rx.await.map_err(|_| ExecutorClosed)
    }

    /// Stops the executor once every previously submitted normal task ran.
    pub fn shutdown(&self) -> Result<(), ExecutorClosed> {
        self.normal
            .send(Envelope::Shutdown)
            .map_err(|_| ExecutorClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.normal.is_disconnected()
    }
}

/// Receiving side; turned into a running task by [`SerialExecutor::spawn`].
pub struct SerialExecutor<S> {
    name: String,
    normal: flume::Receiver<Envelope<S>>,
    high: flume::Receiver<Envelope<S>>,
}

/// Creates an executor and its submission handle.
///
/// The handle exists before the state so the state can keep a clone of it
/// for re-submitting work (timers, follow-up callbacks).
pub fn channel<S: Send + 'static>(
    name: impl Into<String>,
) -> (ExecutorHandle<S>, SerialExecutor<S>) {
    let (normal_tx, normal_rx) = flume::unbounded();
    let (high_tx, high_rx) = flume::unbounded();
    (
        ExecutorHandle {
            normal: normal_tx,
            high: high_tx,
        },
        SerialExecutor {
            name: name.into(),
            normal: normal_rx,
            high: high_rx,
        },
    )
}

impl<S: Send + 'static> SerialExecutor<S> {
    /// Starts running tasks against `state` on `runtime`.
    ///
    /// The returned handle resolves to the state after shutdown.
    pub fn spawn(self, state: S, runtime: &Handle) -> JoinHandle<S> {
        let span = info_span!("serial_executor", executor = %self.name);
        runtime.spawn(self.run(state).instrument(span))
    }

    async fn run(self, mut state: S) -> S {
        debug!("executor started");
        let mut executed: u64 = 0;
        loop {
            let envelope = match self.high.try_recv() {
                Ok(envelope) => envelope,
                Err(_) => tokio::select! {
                    biased;
                    Ok(envelope) = self.high.recv_async() => envelope,
                    received = self.normal.recv_async() => match received {
                        Ok(envelope) => envelope,
                        Err(_) => break,
                    },
                },
            };
            match envelope {
                Envelope::Run(task) => {
                    task(&mut state);
                    executed += 1;
                    trace!(executed, "task complete");
                }
                Envelope::Shutdown => break,
            }
        }
        debug!(executed, "executor stopped");
        state
    }
}
