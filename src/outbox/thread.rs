//! Background thread driving an [`OutboxRelay`].

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use crate::bus::Publisher;
use crate::store::OutboxStore;

use super::relay::{OutboxRelay, RelayStats};

/// Cumulative statistics from a relay thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayThreadStats {
    pub sweeps: usize,
    pub published: usize,
    pub failed: usize,
}

/// A background thread that sweeps the outbox on a fixed interval.
///
/// ## Example
///
/// ```ignore
/// let relay = OutboxRelay::new(store.clone(), broker.clone());
/// let thread = OutboxRelayThread::spawn(relay, Duration::from_secs(1));
///
/// // ... serve requests ...
///
/// let stats = thread.stop();
/// ```
pub struct OutboxRelayThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<RelayThreadStats>>,
}

impl OutboxRelayThread {
    /// Spawn the sweep loop. The interval elapses between sweeps whether
    /// or not the previous sweep found work.
    pub fn spawn<S, P>(relay: OutboxRelay<S, P>, poll_interval: Duration) -> Self
    where
        S: OutboxStore + Send + 'static,
        P: Publisher + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = RelayThreadStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                stats.sweeps += 1;
                match relay.run_once() {
                    Ok(RelayStats {
                        published, failed, ..
                    }) => {
                        stats.published += published;
                        stats.failed += failed;
                    }
                    Err(err) => {
                        // Transient storage trouble; the next sweep retries.
                        warn!(error = %err, "outbox sweep failed");
                    }
                }

                thread::sleep(poll_interval);
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) -> RelayThreadStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            RelayThreadStats::default()
        }
    }
}

impl Drop for OutboxRelayThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        // Don't join on drop - let the thread finish naturally
    }
}
