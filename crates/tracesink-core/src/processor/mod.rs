//! Processors - receive trace lifecycle events and feed exporters
//!
//! A processor sits between the execution engine and the exporters. The
//! [`BatchTraceProcessor`] buffers items on a background worker and exports
//! them in batches; the [`SimpleTraceProcessor`] exports each item as it
//! arrives. Both isolate exporter failures: an exporter that errors or panics
//! is logged and skipped, never propagated to the producer.

mod batch;
mod registry;
mod simple;

pub use batch::{BatchTraceProcessor, ProcessorGuard, ProcessorStats};
pub use registry::{
    add_trace_processor, emit_span_end, emit_span_start, emit_trace_end, emit_trace_start,
    flush_all, set_trace_processors, set_tracing_disabled, shutdown_all, trace_processors,
    tracing_disabled,
};
pub use simple::SimpleTraceProcessor;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::export::TracingExporter;
use crate::models::{Span, Trace, TraceItem};

/// Receives trace and span lifecycle events from the execution engine
pub trait TracingProcessor: Send + Sync {
    /// A trace has started
    fn on_trace_start(&self, trace: &Trace);

    /// A trace has ended
    fn on_trace_end(&self, _trace: &Trace) {}

    /// A span has started
    fn on_span_start(&self, _span: &Span) {}

    /// A span has ended
    fn on_span_end(&self, span: &Span);

    /// Export everything received so far
    fn force_flush(&self) -> Result<()>;

    /// Export everything received so far and stop accepting new items
    fn shutdown(&self) -> Result<()>;
}

/// Hand `items` to every exporter in order, logging and swallowing failures
///
/// Returns the number of exporters that accepted the batch.
pub(crate) fn export_isolated(exporters: &[Arc<dyn TracingExporter>], items: &[TraceItem]) -> usize {
    let mut delivered = 0;

    for exporter in exporters {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| exporter.export(items)))
            .unwrap_or_else(|payload| {
                Err(Error::exporter(exporter.name(), panic_message(payload.as_ref())))
            });

        match outcome {
            Ok(()) => {
                debug!(exporter = exporter.name(), items = items.len(), "Exported batch");
                delivered += 1;
            }
            Err(e) => log_export_failure(exporter.name(), &e),
        }
    }

    delivered
}

/// Log an exporter failure at a level matching its severity
pub(crate) fn log_export_failure(exporter: &str, error: &Error) {
    match error {
        Error::MalformedPayload { .. } => {
            warn!(exporter, "Exporter reported malformed payload: {}", error);
        }
        _ => error!(exporter, "Export failed: {}", error),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Exporters that misbehave on purpose

    use once_cell::sync::Lazy;
    use parking_lot::Mutex;

    use super::*;
    use crate::models::TraceItem;

    /// Held by every test that installs processors in the global registry
    pub static REGISTRY_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Always returns an error
    pub struct FailingExporter;

    impl TracingExporter for FailingExporter {
        fn name(&self) -> &str {
            "failing"
        }

        fn export(&self, _items: &[TraceItem]) -> Result<()> {
            Err(Error::exporter("failing", "backend unavailable"))
        }
    }

    /// Always panics
    pub struct PanickingExporter;

    impl TracingExporter for PanickingExporter {
        fn name(&self) -> &str {
            "panicking"
        }

        fn export(&self, _items: &[TraceItem]) -> Result<()> {
            panic!("exporter bug")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FailingExporter, PanickingExporter};
    use super::*;
    use crate::export::InMemoryExporter;

    #[test]
    fn test_failures_do_not_stop_delivery() {
        let memory = InMemoryExporter::new();
        let exporters: Vec<Arc<dyn TracingExporter>> = vec![
            Arc::new(FailingExporter),
            Arc::new(PanickingExporter),
            Arc::new(memory.clone()),
        ];
        let items = vec![TraceItem::from(Trace::new("run"))];

        let delivered = export_isolated(&exporters, &items);

        assert_eq!(delivered, 1);
        assert_eq!(memory.items(), items);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: bang");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }
}
