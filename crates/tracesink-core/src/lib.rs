//! # TraceSink
//!
//! Trace export pipeline for AI agent runs.
//!
//! An execution engine reports traces and spans; TraceSink batches them and
//! hands them to exporters, the main one being a console exporter that prints
//! model, token usage and the conversation of each LLM generation.
//!
//! ## Architecture
//!
//! - **Models**: `Trace`, `Span` with a typed `SpanData` payload, and the
//!   `TraceItem` union exporters receive
//! - **Processors**: batching (background worker) and simple (inline), plus a
//!   process-wide registry
//! - **Exporters**: console and in-memory
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tracesink::prelude::*;
//!
//! let console: Arc<dyn TracingExporter> = Arc::new(ConsoleExporter::new(ConsoleConfig::default()));
//! let guard = BatchTraceProcessor::new(vec![console], ProcessorConfig::default())
//!     .unwrap()
//!     .into_guard();
//! set_trace_processors(vec![guard.processor()]);
//!
//! emit_trace_start(&Trace::new("Agent workflow"));
//! // Dropping the guard flushes whatever is still buffered
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod demo;
pub mod error;
pub mod export;
pub mod models;
pub mod processor;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::{Config, ConsoleConfig, ProcessorConfig, UnhandledSpanPolicy};
    pub use crate::error::{Error, Result};
    pub use crate::export::{ConsoleExporter, InMemoryExporter, TracingExporter};
    pub use crate::models::*;
    pub use crate::processor::{
        emit_span_end, emit_span_start, emit_trace_end, emit_trace_start, set_trace_processors,
        BatchTraceProcessor, ProcessorGuard, SimpleTraceProcessor, TracingProcessor,
    };
}
