//! In-memory exporter, mainly for tests

use std::sync::Arc;

use parking_lot::Mutex;

use super::TracingExporter;
use crate::error::Result;
use crate::models::{Span, Trace, TraceItem};

/// Collects every exported item in order
///
/// Clones share the same storage, so a test can keep one handle and give the
/// other to a processor.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    inner: Arc<Mutex<Collected>>,
}

#[derive(Debug, Default)]
struct Collected {
    items: Vec<TraceItem>,
    batches: usize,
}

impl InMemoryExporter {
    /// Create an empty exporter
    pub fn new() -> Self {
        Self::default()
    }

    /// All items exported so far
    pub fn items(&self) -> Vec<TraceItem> {
        self.inner.lock().items.clone()
    }

    /// Exported traces
    pub fn traces(&self) -> Vec<Trace> {
        self.inner
            .lock()
            .items
            .iter()
            .filter_map(|item| match item {
                TraceItem::Trace(trace) => Some(trace.clone()),
                TraceItem::Span(_) => None,
            })
            .collect()
    }

    /// Exported spans
    pub fn spans(&self) -> Vec<Span> {
        self.inner
            .lock()
            .items
            .iter()
            .filter_map(|item| match item {
                TraceItem::Span(span) => Some(span.clone()),
                TraceItem::Trace(_) => None,
            })
            .collect()
    }

    /// Number of `export` calls received
    pub fn batch_count(&self) -> usize {
        self.inner.lock().batches
    }

    /// Forget everything collected
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
        inner.batches = 0;
    }
}

impl TracingExporter for InMemoryExporter {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn export(&self, items: &[TraceItem]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.items.extend_from_slice(items);
        inner.batches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationSpanData, SpanData};

    #[test]
    fn test_collects_across_clones() {
        let exporter = InMemoryExporter::new();
        let handle = exporter.clone();

        let trace = Trace::new("run");
        let span = Span::new(
            &trace.trace_id,
            SpanData::Generation(GenerationSpanData::new("gpt-4o")),
        );
        exporter
            .export(&[trace.clone().into(), span.clone().into()])
            .unwrap();

        assert_eq!(handle.items().len(), 2);
        assert_eq!(handle.traces(), vec![trace]);
        assert_eq!(handle.spans(), vec![span]);
        assert_eq!(handle.batch_count(), 1);

        handle.clear();
        assert!(exporter.items().is_empty());
        assert_eq!(exporter.batch_count(), 0);
    }
}
