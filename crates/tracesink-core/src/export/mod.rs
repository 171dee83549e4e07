//! Exporters - where batches of trace items end up
//!
//! An exporter receives ordered batches from a processor. It must not panic on
//! any well-formed item; errors it returns are logged by the processor and
//! never reach the producer.

mod console;
mod memory;

pub use console::{ConsoleExporter, RenderedBatch, NOT_AVAILABLE};
pub use memory::InMemoryExporter;

use crate::error::Result;
use crate::models::TraceItem;

/// Receives batches of trace items from a processor
pub trait TracingExporter: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Export a batch of items, in order
    fn export(&self, items: &[TraceItem]) -> Result<()>;
}
