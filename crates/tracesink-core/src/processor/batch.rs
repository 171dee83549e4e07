//! Batching trace processor
//!
//! Items are queued on a bounded channel and exported by a background worker,
//! either when a full batch has accumulated, when the schedule delay elapses,
//! on `force_flush`, or on shutdown. The worker runs on its own OS thread with
//! a current-thread tokio runtime, so producers need no runtime of their own
//! and shutdown can block until the final flush is done.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinError;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{log_export_failure, panic_message, TracingProcessor};
use crate::config::ProcessorConfig;
use crate::error::{Error, Result};
use crate::export::TracingExporter;
use crate::models::{Span, Trace, TraceItem};

enum Command {
    Flush(std_mpsc::Sender<()>),
    Shutdown,
}

/// Processor that exports trace items in batches from a background worker
pub struct BatchTraceProcessor {
    config: ProcessorConfig,
    item_tx: mpsc::Sender<TraceItem>,
    command_tx: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    exported_items: AtomicU64,
    exported_batches: AtomicU64,
    export_failures: AtomicU64,
}

impl BatchTraceProcessor {
    /// Create a processor and start its worker
    pub fn new(exporters: Vec<Arc<dyn TracingExporter>>, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;

        let (item_tx, item_rx) = mpsc::channel(config.max_queue_size);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        let in_flight = exporters.iter().map(|_| None).collect();
        let worker = Worker {
            exporters,
            max_batch_size: config.max_batch_size,
            schedule_delay: config.schedule_delay,
            export_timeout: config.export_timeout,
            in_flight,
            item_rx,
            command_rx,
            counters: Arc::clone(&counters),
        };

        let export_timeout = config.export_timeout;
        let handle = thread::Builder::new()
            .name("tracesink-batch".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start batch processor runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(worker.run());
                runtime.shutdown_timeout(export_timeout);
            })?;

        info!(
            "Batch processor started (max_batch_size={}, schedule_delay={})",
            config.max_batch_size,
            humantime::format_duration(config.schedule_delay)
        );

        Ok(Self {
            config,
            item_tx,
            command_tx,
            worker: Mutex::new(Some(handle)),
            counters,
        })
    }

    /// Wrap the processor in a guard that shuts it down when dropped
    pub fn into_guard(self) -> ProcessorGuard {
        ProcessorGuard::new(Arc::new(self))
    }

    /// Queue one item for export
    ///
    /// Never blocks. When the queue is full, or the processor has been shut
    /// down, the item is dropped and counted.
    pub fn submit(&self, item: TraceItem) {
        match self.item_tx.try_send(item) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(item)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = item.kind(),
                    trace_id = item.trace_id(),
                    "Trace queue is full (max_queue_size={}), dropping item",
                    self.config.max_queue_size
                );
            }
            Err(TrySendError::Closed(item)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    kind = item.kind(),
                    trace_id = item.trace_id(),
                    "Batch processor is shut down, dropping item"
                );
            }
        }
    }

    /// Get processor statistics
    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            exported_items: self.counters.exported_items.load(Ordering::Relaxed),
            exported_batches: self.counters.exported_batches.load(Ordering::Relaxed),
            export_failures: self.counters.export_failures.load(Ordering::Relaxed),
            queue_len: self.item_tx.max_capacity() - self.item_tx.capacity(),
        }
    }

    /// Whether the worker has been stopped
    pub fn is_shut_down(&self) -> bool {
        self.worker.lock().is_none()
    }
}

impl TracingProcessor for BatchTraceProcessor {
    fn on_trace_start(&self, trace: &Trace) {
        self.submit(TraceItem::Trace(trace.clone()));
    }

    fn on_span_end(&self, span: &Span) {
        self.submit(TraceItem::Span(span.clone()));
    }

    /// Blocks until every item submitted before the call has been exported
    fn force_flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = std_mpsc::channel();
        self.command_tx
            .send(Command::Flush(ack_tx))
            .map_err(|_| Error::Shutdown)?;
        ack_rx.recv().map_err(|_| Error::Shutdown)
    }

    /// Blocks until the final flush is done. Calling it again is a no-op.
    fn shutdown(&self) -> Result<()> {
        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };

        debug!("Shutting down batch processor");
        // The worker may already be gone if its runtime failed to start
        let _ = self.command_tx.send(Command::Shutdown);

        handle
            .join()
            .map_err(|payload| Error::exporter("batch_processor", panic_message(payload.as_ref())))?;

        info!(
            "Batch processor stopped ({} exported, {} dropped)",
            self.counters.exported_items.load(Ordering::Relaxed),
            self.counters.dropped.load(Ordering::Relaxed)
        );
        Ok(())
    }
}

impl Drop for BatchTraceProcessor {
    fn drop(&mut self) {
        if let Err(e) = TracingProcessor::shutdown(self) {
            error!("Batch processor shutdown failed: {}", e);
        }
    }
}

/// Batch processor statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Items accepted into the queue
    pub submitted: u64,
    /// Items dropped because the queue was full or closed
    pub dropped: u64,
    /// Items handed to exporters
    pub exported_items: u64,
    /// Batches handed to exporters
    pub exported_batches: u64,
    /// Exporter calls that failed, panicked or timed out
    pub export_failures: u64,
    /// Items currently waiting in the queue
    pub queue_len: usize,
}

/// Shuts the wrapped processor down when dropped
///
/// Keep the guard alive for as long as tracing should run. Dropping it,
/// including during unwinding, flushes everything still buffered.
pub struct ProcessorGuard {
    processor: Arc<BatchTraceProcessor>,
}

impl ProcessorGuard {
    /// Guard an already shared processor
    pub fn new(processor: Arc<BatchTraceProcessor>) -> Self {
        Self { processor }
    }

    /// Shared handle to the processor, e.g. for registration
    pub fn processor(&self) -> Arc<BatchTraceProcessor> {
        Arc::clone(&self.processor)
    }
}

impl Deref for ProcessorGuard {
    type Target = BatchTraceProcessor;

    fn deref(&self) -> &Self::Target {
        &self.processor
    }
}

impl Drop for ProcessorGuard {
    fn drop(&mut self) {
        if let Err(e) = self.processor.shutdown() {
            error!("Batch processor shutdown failed: {}", e);
        }
    }
}

struct Worker {
    exporters: Vec<Arc<dyn TracingExporter>>,
    max_batch_size: usize,
    schedule_delay: Duration,
    export_timeout: Duration,
    /// Export calls that outlived their timeout, one slot per exporter
    in_flight: Vec<Option<tokio::task::JoinHandle<Result<()>>>>,
    item_rx: mpsc::Receiver<TraceItem>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(mut self) {
        let mut batch: Vec<TraceItem> = Vec::with_capacity(self.max_batch_size);
        let mut flush_interval =
            interval_at(Instant::now() + self.schedule_delay, self.schedule_delay);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                Some(command) = self.command_rx.recv() => match command {
                    Command::Flush(ack) => {
                        self.drain_queue(&mut batch);
                        self.flush_all(&mut batch).await;
                        let _ = ack.send(());
                    }
                    Command::Shutdown => {
                        self.item_rx.close();
                        self.drain_queue(&mut batch);
                        self.flush_all(&mut batch).await;
                        break;
                    }
                },

                received = self.item_rx.recv() => match received {
                    Some(item) => {
                        batch.push(item);
                        if batch.len() >= self.max_batch_size {
                            self.flush_all(&mut batch).await;
                        }
                    }
                    // Every sender is gone; the processor was dropped
                    None => {
                        self.flush_all(&mut batch).await;
                        break;
                    }
                },

                _ = flush_interval.tick() => {
                    if !batch.is_empty() {
                        self.flush_all(&mut batch).await;
                    }
                }
            }
        }

        debug!("Batch processor worker exiting");
    }

    fn drain_queue(&mut self, batch: &mut Vec<TraceItem>) {
        while let Ok(item) = self.item_rx.try_recv() {
            batch.push(item);
        }
    }

    /// Export `batch` in chunks of at most `max_batch_size`, leaving it empty
    async fn flush_all(&mut self, batch: &mut Vec<TraceItem>) {
        while !batch.is_empty() {
            let take = batch.len().min(self.max_batch_size);
            let chunk: Arc<[TraceItem]> = batch.drain(..take).collect();
            self.export_chunk(chunk).await;
        }
    }

    async fn export_chunk(&mut self, chunk: Arc<[TraceItem]>) {
        debug!("Flushing batch of {} items", chunk.len());

        let export_timeout = self.export_timeout;
        for (exporter, in_flight) in self.exporters.iter().zip(self.in_flight.iter_mut()) {
            let name = exporter.name().to_string();

            // Each exporter sees at most one call at a time, in queue order
            if let Some(mut previous) = in_flight.take() {
                match timeout(export_timeout, &mut previous).await {
                    Ok(joined) => {
                        if let Some(e) = call_failure(&name, joined) {
                            debug!(
                                exporter = %name,
                                "Timed-out export finished with error: {}", e
                            );
                        }
                    }
                    Err(_) => {
                        *in_flight = Some(previous);
                        self.counters.export_failures.fetch_add(1, Ordering::Relaxed);
                        log_export_failure(
                            &name,
                            &Error::exporter(
                                &name,
                                format!(
                                    "previous export still running; skipped {} items",
                                    chunk.len()
                                ),
                            ),
                        );
                        continue;
                    }
                }
            }

            let mut task = {
                let exporter = Arc::clone(exporter);
                let chunk = Arc::clone(&chunk);
                tokio::task::spawn_blocking(move || exporter.export(&chunk))
            };

            let failure = match timeout(export_timeout, &mut task).await {
                Ok(joined) => call_failure(&name, joined),
                Err(_) => {
                    *in_flight = Some(task);
                    Some(Error::exporter(
                        &name,
                        format!(
                            "timed out after {}",
                            humantime::format_duration(export_timeout)
                        ),
                    ))
                }
            };

            match failure {
                None => debug!(exporter = %name, items = chunk.len(), "Exported batch"),
                Some(e) => {
                    self.counters.export_failures.fetch_add(1, Ordering::Relaxed);
                    log_export_failure(&name, &e);
                }
            }
        }

        self.counters
            .exported_items
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        self.counters.exported_batches.fetch_add(1, Ordering::Relaxed);
    }
}

/// The failure, if any, of a finished export call
fn call_failure(name: &str, joined: std::result::Result<Result<()>, JoinError>) -> Option<Error> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(join_error) if join_error.is_panic() => Some(Error::exporter(
            name,
            panic_message(join_error.into_panic().as_ref()),
        )),
        Err(join_error) => Some(Error::exporter(name, join_error.to_string())),
    }
}
