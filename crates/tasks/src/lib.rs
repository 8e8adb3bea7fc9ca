//! Minimal cooperative task supervisor.
//!
//! Modeled on the daemon's `TaskManager`/`TaskExecutor` split: every
//! long-running piece of the system (the block poller, a provider
//! instance, the RPC server, the periodic equivocation check) is spawned
//! through a [`TaskExecutor`] obtained from one [`TaskManager`]. Tasks
//! marked critical are expected to run until shutdown; if one exits early
//! (successfully or with an error) that's treated as fatal for the whole
//! daemon, mirroring how the control loop must never silently stop voting.

use std::future::Future;

use tokio::{
    runtime::Handle,
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{error, info, warn};

/// Outcome of a spawned task, reported back to the [`TaskManager`].
#[derive(Debug)]
pub struct TaskExit {
    pub name: String,
    pub critical: bool,
    pub result: Result<(), anyhow::Error>,
}

/// Owns the runtime handle and the channel critical tasks report exit on.
pub struct TaskManager {
    handle: Handle,
    exit_tx: mpsc::UnboundedSender<TaskExit>,
    exit_rx: mpsc::UnboundedReceiver<TaskExit>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl TaskManager {
    pub fn new(handle: Handle) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _rx) = tokio::sync::watch::channel(false);
        Self {
            handle,
            exit_tx,
            exit_rx,
            shutdown_tx,
        }
    }

    pub fn create_executor(&self) -> TaskExecutor {
        TaskExecutor {
            handle: self.handle.clone(),
            exit_tx: self.exit_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
        }
    }

    /// A receiver that flips to `true` once shutdown has been requested,
    /// either by a signal or by a critical task exiting.
    pub fn shutdown_signal(&self) -> tokio::sync::watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Installs Ctrl-C handling that requests shutdown.
    pub fn start_signal_listeners(&self) {
        let shutdown_tx = self.shutdown_tx.clone();
        self.handle.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    /// Blocks until shutdown is requested (by signal or a critical task
    /// exiting), then waits up to `timeout` for remaining tasks to settle.
    pub fn monitor(mut self, timeout: Option<std::time::Duration>) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.handle.clone().block_on(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    exit = self.exit_rx.recv() => {
                        if let Some(exit) = exit {
                            if exit.critical {
                                match &exit.result {
                                    Ok(()) => warn!(task = %exit.name, "critical task exited"),
                                    Err(e) => error!(task = %exit.name, %e, "critical task failed"),
                                }
                                let _ = self.shutdown_tx.send(true);
                                break;
                            } else {
                                info!(task = %exit.name, "non-critical task exited");
                            }
                        }
                    }
                }
            }

            if let Some(timeout) = timeout {
                tokio::time::sleep(timeout).await;
            }
        });

        Ok(())
    }
}

/// Handle used to spawn tasks; cheap to clone, shared by every component
/// that needs to start background work.
#[derive(Clone)]
pub struct TaskExecutor {
    handle: Handle,
    exit_tx: mpsc::UnboundedSender<TaskExit>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

impl TaskExecutor {
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// A shutdown signal that can be raced against other futures at
    /// suspension points (chain/signer/store calls). Resolves once
    /// shutdown has been requested.
    pub fn shutdown_signal(&self) -> tokio::sync::watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Spawns a task whose unexpected exit is fatal for the daemon.
    pub fn spawn_critical_async<F>(&self, name: &str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn_inner(name, true, fut)
    }

    /// Spawns best-effort background work (e.g. a periodic check) whose
    /// exit does not bring down the daemon.
    pub fn spawn_async<F>(&self, name: &str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.spawn_inner(name, false, fut)
    }

    fn spawn_inner<F>(&self, name: &str, critical: bool, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.to_string();
        let exit_tx = self.exit_tx.clone();
        self.handle.spawn(async move {
            let result = fut.await;
            let _ = exit_tx.send(TaskExit {
                name,
                critical,
                result,
            });
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_critical_exit_does_not_shut_down() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();
        let mut shutdown = manager.shutdown_signal();

        executor.spawn_async("noop", async { Ok(()) });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!*shutdown.borrow_and_update());
    }

    #[tokio::test]
    async fn critical_exit_requests_shutdown() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();
        let mut shutdown = manager.shutdown_signal();

        executor.spawn_critical_async("boom", async { anyhow::bail!("boom") });

        shutdown.changed().await.unwrap();
        assert!(*shutdown.borrow());
    }
}
