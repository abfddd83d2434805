// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The trace sink service and its handle.
//!
//! Producers hand documents to the service over an unbounded channel; a
//! single service task accumulates them into an open batch and emits it when
//! the size cap is reached or the window elapses, whichever comes first.
//! Emitted batches are shipped on spawned tasks, so the next window opens
//! regardless of how slow the backend is.

use crate::config::SinkConfig;
use crate::document::TraceDocument;
use crate::error::SinkError;
use crate::shipper::BulkShipper;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Counters shared between the handle, the service and the shipper.
#[derive(Debug, Default)]
pub struct SinkStats {
    pub(crate) pending: AtomicUsize,
    pub(crate) dropped_events: AtomicU64,
    pub(crate) dropped_batches: AtomicU64,
}

#[derive(Debug)]
pub enum SinkCommand {
    Enqueue(TraceDocument),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle for feeding documents into a running sink.
///
/// Cloneable and safe to use from any number of threads. No method blocks
/// the caller, and none of them surfaces a delivery failure: at worst an
/// event is counted as dropped.
#[derive(Clone)]
pub struct TraceSinkHandle {
    tx: mpsc::UnboundedSender<SinkCommand>,
    shipper: Arc<BulkShipper>,
    stats: Arc<SinkStats>,
    max_pending_docs: usize,
}

impl TraceSinkHandle {
    /// Queues a document for batched delivery.
    ///
    /// When the pending bound is hit, or the sink has been shut down, the
    /// document is dropped and counted instead of blocking or failing the
    /// caller.
    pub fn enqueue(&self, document: TraceDocument) {
        if self.stats.pending.load(Ordering::Relaxed) >= self.max_pending_docs {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
            warn!(
                "trace sink queue full ({} pending), dropping event",
                self.max_pending_docs
            );
            return;
        }

        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(SinkCommand::Enqueue(document)).is_err() {
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
            debug!("trace sink is shut down, dropping event");
        }
    }

    /// Ships one document immediately, bypassing the batcher. Fire and
    /// forget: failures are logged by the shipper and swallowed.
    pub fn ship_one(&self, document: TraceDocument) {
        let shipper = Arc::clone(&self.shipper);
        tokio::spawn(async move { shipper.ship_one(document).await });
    }

    /// Waits until every document enqueued before this call has been handed
    /// to the shipper. Does not wait for in-flight bulk requests.
    pub async fn flush(&self) -> Result<(), String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {e}"))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {e}"))
    }

    /// Stops the sink: previously enqueued documents are drained and the
    /// final partial batch is shipped, then the service task exits. Events
    /// enqueued after shutdown are dropped and counted.
    pub fn shutdown(&self) {
        if self.tx.send(SinkCommand::Shutdown).is_err() {
            debug!("trace sink already shut down");
        }
    }

    /// Events rejected by the pending bound or enqueued after shutdown.
    pub fn dropped_events(&self) -> u64 {
        self.stats.dropped_events.load(Ordering::Relaxed)
    }

    /// Batches dropped by the in-flight cap or a delivery failure.
    pub fn dropped_batches(&self) -> u64 {
        self.stats.dropped_batches.load(Ordering::Relaxed)
    }
}

/// The sink service: owns the batching state and processes commands until
/// shutdown. Spawn [`TraceSink::run`] on the runtime to start the pipeline.
pub struct TraceSink {
    config: SinkConfig,
    shipper: Arc<BulkShipper>,
    stats: Arc<SinkStats>,
    rx: mpsc::UnboundedReceiver<SinkCommand>,
}

impl TraceSink {
    pub fn new(config: SinkConfig) -> Result<(Self, TraceSinkHandle), SinkError> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(SinkStats::default());
        let shipper = Arc::new(BulkShipper::new(&config, Arc::clone(&stats))?);

        let handle = TraceSinkHandle {
            tx,
            shipper: Arc::clone(&shipper),
            stats: Arc::clone(&stats),
            max_pending_docs: config.max_pending_docs,
        };
        let service = TraceSink {
            config,
            shipper,
            stats,
            rx,
        };

        Ok((service, handle))
    }

    /// Runs the service, processing commands in FIFO order until a shutdown
    /// command arrives or every handle is dropped.
    pub async fn run(mut self) {
        debug!("trace sink service started");

        let mut open_batch: Vec<TraceDocument> = Vec::with_capacity(self.config.max_batch_size);
        // Armed when a batch opens; an empty window has no deadline and
        // emits nothing.
        let mut deadline: Option<Instant> = None;

        loop {
            let window_closes = deadline;
            let window_expired = async move {
                match window_closes {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(SinkCommand::Enqueue(document)) => {
                        self.stats.pending.fetch_sub(1, Ordering::Relaxed);
                        if open_batch.is_empty() {
                            deadline = Some(Instant::now() + self.config.window_duration);
                        }
                        open_batch.push(document);
                        if open_batch.len() >= self.config.max_batch_size {
                            self.emit(&mut open_batch, &mut deadline);
                        }
                    }
                    Some(SinkCommand::Flush(response_tx)) => {
                        self.emit(&mut open_batch, &mut deadline);
                        if response_tx.send(()).is_err() {
                            error!("failed to send flush response - receiver dropped");
                        }
                    }
                    Some(SinkCommand::Shutdown) | None => {
                        debug!("trace sink service draining");
                        break;
                    }
                },
                () = window_expired => {
                    self.emit(&mut open_batch, &mut deadline);
                }
            }
        }

        // Everything enqueued ahead of the shutdown command has already been
        // drained in FIFO order; ship the final partial batch.
        self.emit(&mut open_batch, &mut deadline);
        debug!("trace sink service stopped");
    }

    /// Closes the open batch and hands it to the shipper on a spawned task.
    /// Empty batches are never shipped.
    fn emit(&self, open_batch: &mut Vec<TraceDocument>, deadline: &mut Option<Instant>) {
        *deadline = None;
        if open_batch.is_empty() {
            return;
        }

        let batch =
            std::mem::replace(open_batch, Vec::with_capacity(self.config.max_batch_size));
        let shipper = Arc::clone(&self.shipper);
        tokio::spawn(async move { shipper.ship(batch).await });
    }
}
