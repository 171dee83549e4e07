//! The event union handed to exporters

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use super::{Span, Trace};
use crate::error::{Error, Result};

/// An exportable event: either a trace start or a finished span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object")]
pub enum TraceItem {
    /// A trace
    #[serde(rename = "trace")]
    Trace(Trace),
    /// A span
    #[serde(rename = "trace.span")]
    Span(Span),
}

impl TraceItem {
    /// Trace ID of the item
    pub fn trace_id(&self) -> &str {
        match self {
            Self::Trace(trace) => &trace.trace_id,
            Self::Span(span) => &span.trace_id,
        }
    }

    /// Short kind label, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Trace(_) => "trace",
            Self::Span(_) => "span",
        }
    }
}

impl From<Trace> for TraceItem {
    fn from(trace: Trace) -> Self {
        Self::Trace(trace)
    }
}

impl From<Span> for TraceItem {
    fn from(span: Span) -> Self {
        Self::Span(span)
    }
}

/// Read JSON-lines trace items; blank lines are skipped
pub fn read_jsonl(reader: impl BufRead) -> Result<Vec<TraceItem>> {
    let mut items = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .map_err(|e| Error::validation(format!("line {}: {e}", index + 1)))?;
        items.push(item);
    }
    Ok(items)
}
