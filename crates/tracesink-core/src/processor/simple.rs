//! Unbuffered processor

use std::sync::Arc;

use super::{export_isolated, TracingProcessor};
use crate::error::Result;
use crate::export::TracingExporter;
use crate::models::{Span, Trace, TraceItem};

/// Exports each trace and finished span as soon as it arrives, on the caller's
/// thread
pub struct SimpleTraceProcessor {
    exporters: Vec<Arc<dyn TracingExporter>>,
}

impl SimpleTraceProcessor {
    /// Create a processor for `exporters`
    pub fn new(exporters: Vec<Arc<dyn TracingExporter>>) -> Self {
        Self { exporters }
    }
}

impl TracingProcessor for SimpleTraceProcessor {
    fn on_trace_start(&self, trace: &Trace) {
        export_isolated(&self.exporters, &[TraceItem::Trace(trace.clone())]);
    }

    fn on_span_end(&self, span: &Span) {
        export_isolated(&self.exporters, &[TraceItem::Span(span.clone())]);
    }

    fn force_flush(&self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
