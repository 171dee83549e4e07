//! Span data model

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A span represents a single operation within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Span ID (`span_` followed by 24 hex chars)
    pub span_id: String,

    /// Trace ID this span belongs to
    pub trace_id: String,

    /// Parent span ID (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// When the operation started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the operation ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Typed payload
    pub span_data: SpanData,

    /// Error recorded on the span
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpanError>,
}

/// An error recorded on a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanError {
    /// Error message
    pub message: String,

    /// Structured error details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Span {
    /// Create a span in `trace_id` with a freshly generated span ID
    pub fn new(trace_id: impl Into<String>, span_data: SpanData) -> Self {
        Self {
            span_id: generate_span_id(),
            trace_id: trace_id.into(),
            parent_id: None,
            started_at: None,
            ended_at: None,
            span_data,
            error: None,
        }
    }

    /// Set the parent span
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Mark the span as started now
    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Mark the span as finished now
    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Record an error on the span
    pub fn set_error(&mut self, message: impl Into<String>, data: Option<Value>) {
        self.error = Some(SpanError {
            message: message.into(),
            data,
        });
    }

    /// Duration in milliseconds, if both timestamps are set
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Generate a span ID of the form `span_<24 hex>`
pub fn generate_span_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("span_{}", &hex[..24])
}

/// Span payload, keyed by its `type` discriminant
///
/// Payload types without a dedicated variant land in [`SpanData::Unknown`]
/// with their fields intact, so nothing is lost between producer and exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum SpanData {
    /// An LLM generation
    Generation(GenerationSpanData),
    /// An agent turn
    Agent(AgentSpanData),
    /// A tool/function call
    Function(FunctionSpanData),
    /// A handoff between agents
    Handoff(HandoffSpanData),
    /// A guardrail check
    Guardrail(GuardrailSpanData),
    /// User-defined span
    Custom(CustomSpanData),
    /// Any other payload type
    Unknown {
        /// The `type` discriminant as received
        span_type: String,
        /// Remaining payload fields
        fields: Map<String, Value>,
    },
}

impl SpanData {
    /// The `type` discriminant string
    pub fn span_type(&self) -> &str {
        match self {
            Self::Generation(_) => "generation",
            Self::Agent(_) => "agent",
            Self::Function(_) => "function",
            Self::Handoff(_) => "handoff",
            Self::Guardrail(_) => "guardrail",
            Self::Custom(_) => "custom",
            Self::Unknown { span_type, .. } => span_type,
        }
    }
}

impl TryFrom<Value> for SpanData {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        let Value::Object(mut fields) = value else {
            return Err("span_data must be an object".to_string());
        };

        let span_type = match fields.remove("type") {
            Some(Value::String(s)) => s,
            Some(other) => return Err(format!("span_data.type must be a string, got {other}")),
            None => return Err("span_data is missing `type`".to_string()),
        };

        match span_type.as_str() {
            "generation" => parse_payload(&span_type, fields).map(Self::Generation),
            "agent" => parse_payload(&span_type, fields).map(Self::Agent),
            "function" => parse_payload(&span_type, fields).map(Self::Function),
            "handoff" => parse_payload(&span_type, fields).map(Self::Handoff),
            "guardrail" => parse_payload(&span_type, fields).map(Self::Guardrail),
            "custom" => parse_payload(&span_type, fields).map(Self::Custom),
            _ => Ok(Self::Unknown {
                span_type: span_type.clone(),
                fields,
            }),
        }
    }
}

impl From<SpanData> for Value {
    fn from(data: SpanData) -> Self {
        let span_type = data.span_type().to_string();
        let mut fields = match data {
            SpanData::Generation(d) => to_object(&d),
            SpanData::Agent(d) => to_object(&d),
            SpanData::Function(d) => to_object(&d),
            SpanData::Handoff(d) => to_object(&d),
            SpanData::Guardrail(d) => to_object(&d),
            SpanData::Custom(d) => to_object(&d),
            SpanData::Unknown { fields, .. } => fields,
        };
        fields.insert("type".to_string(), Value::String(span_type));
        Value::Object(fields)
    }
}

fn parse_payload<T: DeserializeOwned>(
    span_type: &str,
    fields: Map<String, Value>,
) -> std::result::Result<T, String> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| format!("invalid `{span_type}` span_data: {e}"))
}

fn to_object<T: Serialize>(data: &T) -> Map<String, Value> {
    match serde_json::to_value(data) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    }
}

/// Payload of an LLM generation span
///
/// `usage`, `input` and `output` are kept as raw JSON. Their shape is checked
/// by the accessors so a bad value degrades one rendered line instead of
/// rejecting the whole span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSpanData {
    /// Model name (e.g., "gemini-2.0-flash", "gpt-4o")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Model settings used for the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<Value>,

    /// Token usage, expected to be a mapping with `input_tokens` / `output_tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,

    /// Input messages, oldest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Output messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl GenerationSpanData {
    /// Create a generation payload for `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Usage mapping; `None` when absent or null
    pub fn usage_map(&self) -> Result<Option<&Map<String, Value>>> {
        match &self.usage {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(Error::malformed(format!(
                "usage must be a mapping, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Input messages; empty when absent or null
    pub fn input_messages(&self) -> Result<&[Value]> {
        message_list("input", self.input.as_ref())
    }

    /// Output messages; empty when absent or null
    pub fn output_messages(&self) -> Result<&[Value]> {
        message_list("output", self.output.as_ref())
    }
}

fn message_list<'a>(field: &str, value: Option<&'a Value>) -> Result<&'a [Value]> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::malformed(format!(
            "{field} must be a sequence, got {}",
            json_kind(other)
        ))),
    }
}

/// Short name of a JSON value's kind, for error messages
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Payload of an agent span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpanData {
    /// Agent name
    pub name: String,

    /// Agents this agent can hand off to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoffs: Option<Vec<String>>,

    /// Tools available to the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,

    /// Declared output type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,
}

/// Payload of a function (tool) call span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpanData {
    /// Function name
    pub name: String,

    /// Raw input arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// Function output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

/// Payload of a handoff span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSpanData {
    /// Agent handing off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_agent: Option<String>,

    /// Agent receiving the handoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_agent: Option<String>,
}

/// Payload of a guardrail span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailSpanData {
    /// Guardrail name
    pub name: String,

    /// Whether the guardrail tripped
    #[serde(default)]
    pub triggered: bool,
}

/// Payload of a user-defined span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSpanData {
    /// Span name
    pub name: String,

    /// Free-form data
    #[serde(default)]
    pub data: Map<String, Value>,
}
