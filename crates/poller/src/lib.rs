//! The Block Poller: a lazy, restartable, monotonically
//! increasing sequence of [`BlockInfo`], built as a bounded channel between
//! a single producer task and its one consumer. The producer never drops a
//! height, even when the consumer stalls past `buffer_size` — it simply
//! backpressures (the channel send blocks).

use std::sync::Arc;
use std::time::Duration;

use fpd_chain_client::{ChainClient, ChainError};
use fpd_common::backoff::{ExponentialBackoff, RetryTracker};
use fpd_primitives::BlockInfo;
use fpd_tasks::TaskExecutor;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Poller configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PollerConfig {
    /// If true, start at the chain's activation height; otherwise start at
    /// `static_start_height`.
    pub auto: bool,
    #[serde(default)]
    pub static_start_height: u64,
    #[serde(with = "humantime_millis", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_buffer_size() -> usize {
    16
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            auto: true,
            static_start_height: 0,
            poll_interval: default_poll_interval(),
            buffer_size: default_buffer_size(),
        }
    }
}

mod humantime_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Consumer handle: pulls blocks one at a time off the bounded channel.
pub struct BlockPoller {
    rx: mpsc::Receiver<BlockInfo>,
}

impl BlockPoller {
    /// Spawns the producer task on `executor` as a critical task named
    /// `name`, and returns the consumer handle.
    pub fn spawn(
        executor: &TaskExecutor,
        chain: Arc<dyn ChainClient>,
        config: PollerConfig,
        name: impl Into<String>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let shutdown = executor.shutdown_signal();
        let task_name: String = name.into();
        executor.spawn_critical_async(&task_name, async move {
            run_producer(chain, config, tx, shutdown).await
        });
        Self { rx }
    }

    /// Pulls the next block in ascending height order. Returns `None` once
    /// the producer has exited (shutdown or a fatal error already reported
    /// to the task supervisor).
    pub async fn recv(&mut self) -> Option<BlockInfo> {
        self.rx.recv().await
    }
}

async fn run_producer(
    chain: Arc<dyn ChainClient>,
    config: PollerConfig,
    tx: mpsc::Sender<BlockInfo>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut next_height = if config.auto {
        chain.query_activated_height().await?
    } else {
        config.static_start_height
    };

    let mut backoff = RetryTracker::new(
        Duration::from_millis(200),
        Duration::from_secs(30),
        ExponentialBackoff::new(2.0),
    );

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let best = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            result = chain.query_best_block() => result,
        };

        let best = match best {
            Ok(best) => {
                backoff.reset();
                best
            }
            Err(e) if e.is_transient() => {
                let delay = backoff.advance();
                warn!(error = %e, delay_ms = delay.as_millis(), "transient error polling best block");
                tokio::select! {
                    _ = shutdown.changed() => return Ok(()),
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
            Err(e) => return Err(e.into()),
        };

        while next_height <= best.height {
            if *shutdown.borrow() {
                return Ok(());
            }

            let block = match chain.query_block(next_height).await {
                Ok(block) => {
                    backoff.reset();
                    block
                }
                Err(ChainError::Cancelled) => return Ok(()),
                Err(e) if e.is_transient() => {
                    let delay = backoff.advance();
                    warn!(height = next_height, error = %e, delay_ms = delay.as_millis(), "transient error fetching block");
                    tokio::select! {
                        _ = shutdown.changed() => return Ok(()),
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
                Err(e) => return Err(e.into()),
            };

            debug!(height = block.height, "poller fetched block");
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                send = tx.send(block) => {
                    if send.is_err() {
                        info!("poller consumer dropped, exiting");
                        return Ok(());
                    }
                }
            }
            next_height += 1;
        }

        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpd_chain_client::MockChainClient;
    use fpd_tasks::TaskManager;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn yields_strictly_ascending_heights_without_gaps() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();

        let chain = Arc::new(MockChainClient::new(1));
        chain.set_best_height(5);

        let mut poller = BlockPoller::spawn(
            &executor,
            chain.clone(),
            PollerConfig {
                auto: true,
                static_start_height: 0,
                poll_interval: Duration::from_millis(10),
                buffer_size: 4,
            },
            "test-poller",
        );

        let mut heights = Vec::new();
        for _ in 0..5 {
            let block = poller.recv().await.expect("block available");
            heights.push(block.height);
        }
        assert_eq!(heights, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn backpressures_rather_than_dropping_when_consumer_stalls() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();

        let chain = Arc::new(MockChainClient::new(1));
        chain.set_best_height(20);

        let mut poller = BlockPoller::spawn(
            &executor,
            chain.clone(),
            PollerConfig {
                auto: true,
                static_start_height: 0,
                poll_interval: Duration::from_millis(5),
                buffer_size: 2,
            },
            "test-poller-backpressure",
        );

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut heights = Vec::new();
        for _ in 0..10 {
            heights.push(poller.recv().await.expect("block available").height);
        }
        assert_eq!(heights, (1..=10).collect::<Vec<_>>());
    }
}
