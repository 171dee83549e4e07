//! Trace data model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trace represents one top-level execution, e.g. a single agent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Trace ID (`trace_` followed by 32 hex chars)
    pub trace_id: String,

    /// Human-readable workflow name
    pub name: String,

    /// Groups related traces, e.g. the turns of one conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Trace {
    /// Start a new trace with a freshly generated ID
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            name: name.into(),
            group_id: None,
            metadata: None,
        }
    }

    /// Set the group ID
    #[must_use]
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Generate a trace ID of the form `trace_<32 hex>`
pub fn generate_trace_id() -> String {
    format!("trace_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_trace_id_shape() {
        let trace = Trace::new("Agent workflow");
        let hex = trace.trace_id.strip_prefix("trace_").unwrap();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let trace = Trace {
            trace_id: "trace_1".to_string(),
            name: "run".to_string(),
            group_id: None,
            metadata: None,
        };
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json, serde_json::json!({"trace_id": "trace_1", "name": "run"}));
    }
}
