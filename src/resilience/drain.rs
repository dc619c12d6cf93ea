//! Background drain of the backpressure queue.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::facade::{FacadeError, ProblemFacade, ProblemFetcher};
use super::limiter::CounterStore;

/// What one drain pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing to do: admission denied, queue empty, or a local error.
    Idle,
    /// One queued request was fetched successfully.
    Delivered,
    /// The request failed and went back to the queue.
    Requeued,
}

/// Retries deferred requests for one counterparty once quota frees up.
///
/// This is the only consumer of the backpressure queue. Each pass probes
/// admission check-only so the probe itself never spends quota, then
/// dequeues a single request and pushes it through the same facade path
/// callers use.
pub struct QueueDrain<F, C> {
    facade: Arc<ProblemFacade<F, C>>,
    counterparty: String,
}

impl<F, C> QueueDrain<F, C> {
    pub fn new(facade: Arc<ProblemFacade<F, C>>, counterparty: impl Into<String>) -> Self {
        Self {
            facade,
            counterparty: counterparty.into(),
        }
    }
}

impl<F: ProblemFetcher, C: CounterStore> QueueDrain<F, C> {
    pub fn run_once(&self) -> DrainOutcome {
        match self.facade.limiter().admit(&self.counterparty, true) {
            Ok(true) => {}
            Ok(false) => return DrainOutcome::Idle,
            Err(err) => {
                warn!(counterparty = %self.counterparty, error = %err,
                    "drain admission probe failed");
                return DrainOutcome::Idle;
            }
        }

        let request = match self.facade.queue().dequeue(&self.counterparty) {
            Ok(Some(request)) => request,
            Ok(None) => return DrainOutcome::Idle,
            Err(err) => {
                warn!(counterparty = %self.counterparty, error = %err,
                    "drain dequeue failed");
                return DrainOutcome::Idle;
            }
        };

        match self.facade.fetch(request.problem_id, &self.counterparty) {
            Ok(_) => {
                debug!(problem_id = request.problem_id,
                    counterparty = %self.counterparty, "queued request delivered");
                DrainOutcome::Delivered
            }
            // The facade already re-queued it; the admission window
            // closed between the probe and the real request.
            Err(FacadeError::RateLimited) => DrainOutcome::Requeued,
            Err(err) => {
                warn!(problem_id = request.problem_id,
                    counterparty = %self.counterparty, error = %err,
                    "queued request failed, re-queueing");
                if let Err(err) = self
                    .facade
                    .queue()
                    .enqueue(&self.counterparty, request)
                {
                    warn!(counterparty = %self.counterparty, error = %err,
                        "failed to re-queue request");
                }
                DrainOutcome::Requeued
            }
        }
    }
}

/// A background thread running one counterparty's drain loop.
///
/// Idle and failed passes sleep `idle_wait` so the loop never spins hot;
/// only a delivered request rolls straight into the next pass.
pub struct QueueDrainThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl QueueDrainThread {
    pub fn spawn<F, C>(drain: QueueDrain<F, C>, idle_wait: Duration) -> Self
    where
        F: ProblemFetcher + 'static,
        C: CounterStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match drain.run_once() {
                DrainOutcome::Delivered => {}
                DrainOutcome::Idle | DrainOutcome::Requeued => thread::sleep(idle_wait),
            }
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for QueueDrainThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
