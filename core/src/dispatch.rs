//! Concurrent fan-out of independent client sends.
//!
//! # Design
//! A driver task walks the generators in order and keeps at most `workers`
//! of them running as spawned tokio tasks. Outcomes are forwarded to a
//! single channel in invocation order, so a slow generator holds back the
//! delivery (not the execution) of the ones after it. Cancellation is
//! cooperative: once the token fires the driver stops delivering and closes
//! the channel, and tasks that are still running are detached rather than
//! aborted. Outcomes already sitting in the channel buffer (up to
//! `channel_capacity`) are still received after cancellation; they are
//! always a gap-free prefix of the batch.
//!
//! With `workers == 1` generators run strictly one at a time.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::client::{ClientGenerator, Exchange};
use crate::config::DispatchConfig;
use crate::error::ClientError;

/// The result of one generator, tagged with its position in the batch.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub index: usize,
    pub result: Result<Exchange, ClientError>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    workers: usize,
    channel_capacity: usize,
}

impl Dispatcher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: DispatchConfig::default().channel_capacity,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.workers).channel_capacity(config.channel_capacity)
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start running `generators` and return the outcome stream.
    ///
    /// Must be called from within a tokio runtime. The receiver yields one
    /// outcome per generator in order, and ends early if `cancel` fires or
    /// the receiver is dropped.
    pub fn dispatch(
        &self,
        generators: Vec<ClientGenerator>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<DispatchOutcome> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let total = generators.len();
        let workers = self.workers;
        let span = info_span!("dispatch", total, workers);

        tokio::spawn(
            async move {
                let mut outcomes = stream::iter(generators.into_iter().enumerate())
                    .map(|(index, generate)| {
                        let task = tokio::spawn(generate());
                        async move {
                            let result = match task.await {
                                Ok(result) => result,
                                Err(join) => Err(ClientError::Task(join.to_string())),
                            };
                            DispatchOutcome { index, result }
                        }
                    })
                    .buffered(workers)
                    .boxed();

                let mut delivered = 0usize;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        next = outcomes.next() => next,
                    };
                    let Some(outcome) = next else {
                        break;
                    };
                    let sent = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = tx.send(outcome) => sent,
                    };
                    if sent.is_err() {
                        debug!(delivered, "outcome receiver dropped");
                        break;
                    }
                    delivered += 1;
                }
                if delivered < total {
                    debug!(delivered, total, "dispatch stopped early");
                }
            }
            .instrument(span),
        );

        rx
    }

    /// Dispatch and drain every outcome into a vector.
    pub async fn collect(
        &self,
        generators: Vec<ClientGenerator>,
        cancel: CancellationToken,
    ) -> Vec<DispatchOutcome> {
        let mut rx = self.dispatch(generators, cancel);
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}
