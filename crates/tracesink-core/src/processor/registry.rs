//! Process-wide processor registry
//!
//! The execution engine reports lifecycle events through the `emit_*`
//! functions; they fan out to every registered processor. The set starts
//! empty and is normally installed once at startup with
//! [`set_trace_processors`].

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, error};

use super::TracingProcessor;
use crate::error::Result;
use crate::models::{Span, Trace};

#[derive(Default)]
struct Registry {
    processors: Vec<Arc<dyn TracingProcessor>>,
    disabled: bool,
}

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

/// Replace the active processors
pub fn set_trace_processors(processors: Vec<Arc<dyn TracingProcessor>>) {
    debug!("Installing {} trace processor(s)", processors.len());
    REGISTRY.write().processors = processors;
}

/// Add a processor to the active set
pub fn add_trace_processor(processor: Arc<dyn TracingProcessor>) {
    REGISTRY.write().processors.push(processor);
}

/// The active processors
pub fn trace_processors() -> Vec<Arc<dyn TracingProcessor>> {
    REGISTRY.read().processors.clone()
}

/// Turn dispatch off (or back on) for the whole process
pub fn set_tracing_disabled(disabled: bool) {
    REGISTRY.write().disabled = disabled;
}

/// Whether dispatch is turned off
pub fn tracing_disabled() -> bool {
    REGISTRY.read().disabled
}

/// Snapshot of the processors to notify; empty while disabled
///
/// Processors are called outside the lock so a hook may itself touch the
/// registry.
fn active() -> Vec<Arc<dyn TracingProcessor>> {
    let registry = REGISTRY.read();
    if registry.disabled {
        Vec::new()
    } else {
        registry.processors.clone()
    }
}

/// Report a started trace
pub fn emit_trace_start(trace: &Trace) {
    for processor in active() {
        processor.on_trace_start(trace);
    }
}

/// Report a finished trace
pub fn emit_trace_end(trace: &Trace) {
    for processor in active() {
        processor.on_trace_end(trace);
    }
}

/// Report a started span
pub fn emit_span_start(span: &Span) {
    for processor in active() {
        processor.on_span_start(span);
    }
}

/// Report a finished span
pub fn emit_span_end(span: &Span) {
    for processor in active() {
        processor.on_span_end(span);
    }
}

/// Flush every registered processor; failures are logged and the first is returned
pub fn flush_all() -> Result<()> {
    let mut first_error = None;
    for processor in trace_processors() {
        if let Err(e) = processor.force_flush() {
            error!("Trace processor flush failed: {}", e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Shut down every registered processor; failures are logged and the first is returned
pub fn shutdown_all() -> Result<()> {
    let mut first_error = None;
    for processor in trace_processors() {
        if let Err(e) = processor.shutdown() {
            error!("Trace processor shutdown failed: {}", e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
