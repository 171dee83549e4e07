//! Synthetic agent run
//!
//! Stands in for an execution engine: emits the trace and spans a single-turn
//! agent run would produce, through the global registry. No model is called;
//! the reply is canned and token counts are word counts.

use serde_json::json;

use crate::models::{AgentSpanData, GenerationSpanData, Span, SpanData, Trace};
use crate::processor::{emit_span_end, emit_span_start, emit_trace_end, emit_trace_start};

/// Parameters of a simulated run
#[derive(Debug, Clone)]
pub struct DemoRun {
    /// Agent name
    pub agent: String,
    /// Agent instructions (sent as the system message)
    pub instructions: String,
    /// Model name recorded on the generation span
    pub model: String,
    /// User prompt
    pub prompt: String,
}

impl Default for DemoRun {
    fn default() -> Self {
        Self {
            agent: "MyAgent".to_string(),
            instructions: "You are a helpful assistant.".to_string(),
            model: "gemini-2.0-flash".to_string(),
            prompt: "Hello, how can you assist me today".to_string(),
        }
    }
}

/// Emit one simulated run and return its final output
pub fn run(demo: &DemoRun) -> String {
    let trace = Trace::new("Agent workflow");
    emit_trace_start(&trace);

    let mut agent_span = Span::new(
        &trace.trace_id,
        SpanData::Agent(AgentSpanData {
            name: demo.agent.clone(),
            handoffs: Some(Vec::new()),
            tools: Some(Vec::new()),
            output_type: Some("str".to_string()),
        }),
    );
    agent_span.start();
    emit_span_start(&agent_span);

    let reply = canned_reply(&demo.agent);

    let mut generation = Span::new(
        &trace.trace_id,
        SpanData::Generation(GenerationSpanData {
            model: Some(demo.model.clone()),
            model_config: Some(json!({"temperature": null, "top_p": null})),
            usage: Some(json!({
                "input_tokens": word_count(&demo.instructions) + word_count(&demo.prompt),
                "output_tokens": word_count(&reply),
            })),
            input: Some(json!([
                {"role": "system", "content": demo.instructions},
                {"role": "user", "content": demo.prompt},
            ])),
            output: Some(json!([{"role": "assistant", "content": reply}])),
        }),
    )
    .with_parent(&agent_span.span_id);
    generation.start();
    emit_span_start(&generation);
    generation.finish();
    emit_span_end(&generation);

    agent_span.finish();
    emit_span_end(&agent_span);
    emit_trace_end(&trace);

    reply
}

fn canned_reply(agent: &str) -> String {
    format!(
        "Hi! I'm {agent}. I can answer questions, explain ideas and help you draft or review text. \
         What would you like to work on?"
    )
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
