//! Console exporter
//!
//! Renders trace items as human-readable lines. Traces get a one-line header,
//! generation spans get model, token usage, the last user message and the
//! first reply. Other span types follow [`UnhandledSpanPolicy`].

use std::fmt::Write as _;
use std::io::{self, Write};

use console::Style;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use super::TracingExporter;
use crate::config::{ColorChoice, ConsoleConfig, UnhandledSpanPolicy};
use crate::error::{Error, Result};
use crate::models::{json_kind, GenerationSpanData, Span, SpanData, Trace, TraceItem};

/// Placeholder for missing or unreadable values
pub const NOT_AVAILABLE: &str = "N/A";

/// Writes rendered trace items to stdout (or any writer)
pub struct ConsoleExporter {
    config: ConsoleConfig,
    palette: Palette,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleExporter {
    /// Create an exporter writing to standard output
    pub fn new(config: ConsoleConfig) -> Self {
        let styled = match config.color {
            ColorChoice::Auto => console::colors_enabled(),
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        };
        Self::build(config, styled, Box::new(io::stdout()))
    }

    /// Create an exporter writing to `writer`
    ///
    /// `ColorChoice::Auto` means unstyled here, since the writer is not a terminal
    /// we can inspect.
    pub fn with_writer(config: ConsoleConfig, writer: impl Write + Send + 'static) -> Self {
        let styled = config.color == ColorChoice::Always;
        Self::build(config, styled, Box::new(writer))
    }

    fn build(config: ConsoleConfig, styled: bool, writer: Box<dyn Write + Send>) -> Self {
        Self {
            config,
            palette: Palette::new(styled),
            writer: Mutex::new(writer),
        }
    }

    /// Render a batch without writing it
    pub fn render(&self, items: &[TraceItem]) -> RenderedBatch {
        let mut batch = RenderedBatch::default();

        for item in items {
            let mut problems = Vec::new();
            let lines = match item {
                TraceItem::Trace(trace) => vec![self.render_trace(trace)],
                TraceItem::Span(span) => self.render_span(span, &mut problems),
            };

            for line in lines {
                batch.text.push_str(&line);
                batch.text.push('\n');
            }

            if !problems.is_empty() {
                batch.malformed_items += 1;
                batch.problems.extend(
                    problems
                        .into_iter()
                        .map(|p| format!("{} {}: {p}", item.kind(), item_id(item))),
                );
            }
        }

        batch
    }

    fn render_trace(&self, trace: &Trace) -> String {
        format!(
            "{} ID: {} | Name: {}",
            self.palette.header.apply_to("[Trace]"),
            trace.trace_id,
            trace.name
        )
    }

    fn render_span(&self, span: &Span, problems: &mut Vec<String>) -> Vec<String> {
        let mut lines = match &span.span_data {
            SpanData::Generation(generation) => self.render_generation(generation, problems),
            other => match self.config.unhandled_spans {
                UnhandledSpanPolicy::Summary => vec![self.render_summary(span, other)],
                UnhandledSpanPolicy::Skip => {
                    debug!(
                        span_id = %span.span_id,
                        span_type = other.span_type(),
                        "Skipping span without console renderer"
                    );
                    return Vec::new();
                }
            },
        };

        if self.config.show_errors {
            if let Some(error) = &span.error {
                lines.push(format!(
                    "⚠️ Error: {}",
                    self.palette.error.apply_to(&error.message)
                ));
            }
        }

        lines
    }

    fn render_generation(
        &self,
        generation: &GenerationSpanData,
        problems: &mut Vec<String>,
    ) -> Vec<String> {
        let model = match &generation.model {
            Some(model) => model.clone(),
            None => self.missing(),
        };

        let usage = generation.usage_map().unwrap_or_else(|e| {
            problems.push(problem_detail(e));
            None
        });

        let mut lines = vec![
            format!("🧠 Model Used: {model}"),
            format!("📥 Input Tokens: {}", self.token_count(usage, "input_tokens")),
            format!("📤 Output Tokens: {}", self.token_count(usage, "output_tokens")),
        ];

        let input = generation.input_messages().unwrap_or_else(|e| {
            problems.push(problem_detail(e));
            &[][..]
        });
        if let Some(last) = input.last() {
            lines.push(format!("🙋 User Asked: {}", self.content(last, problems)));
        }

        let output = generation.output_messages().unwrap_or_else(|e| {
            problems.push(problem_detail(e));
            &[][..]
        });
        if let Some(first) = output.first() {
            lines.push(format!("🤖 Bot Replied: {}", self.content(first, problems)));
        }

        lines
    }

    fn render_summary(&self, span: &Span, data: &SpanData) -> String {
        let mut details = String::new();
        match data {
            SpanData::Agent(agent) => {
                let _ = write!(details, " | Name: {}", agent.name);
                if let Some(tools) = agent.tools.as_ref().filter(|t| !t.is_empty()) {
                    let _ = write!(details, " | Tools: {}", tools.join(", "));
                }
                if let Some(handoffs) = agent.handoffs.as_ref().filter(|h| !h.is_empty()) {
                    let _ = write!(details, " | Handoffs: {}", handoffs.join(", "));
                }
            }
            SpanData::Function(function) => {
                let _ = write!(details, " | Name: {}", function.name);
                if let Some(input) = &function.input {
                    let _ = write!(details, " | Input: {input}");
                }
                if let Some(output) = &function.output {
                    let _ = write!(details, " | Output: {}", display_value(output));
                }
            }
            SpanData::Handoff(handoff) => {
                let from = handoff.from_agent.clone().unwrap_or_else(|| self.missing());
                let to = handoff.to_agent.clone().unwrap_or_else(|| self.missing());
                let _ = write!(details, " | {from} -> {to}");
            }
            SpanData::Guardrail(guardrail) => {
                let _ = write!(
                    details,
                    " | Name: {} | Triggered: {}",
                    guardrail.name, guardrail.triggered
                );
            }
            SpanData::Custom(custom) => {
                let _ = write!(details, " | Name: {}", custom.name);
            }
            SpanData::Generation(_) | SpanData::Unknown { .. } => {}
        }

        format!(
            "{} {}{details} | ID: {}",
            self.palette.header.apply_to("[Span]"),
            data.span_type(),
            span.span_id
        )
    }

    fn token_count(&self, usage: Option<&Map<String, Value>>, key: &str) -> String {
        match usage.and_then(|u| u.get(key)) {
            None | Some(Value::Null) => self.missing(),
            Some(value) => display_value(value),
        }
    }

    fn content(&self, record: &Value, problems: &mut Vec<String>) -> String {
        let Value::Object(record) = record else {
            problems.push(format!(
                "message record must be a mapping, got {}",
                json_kind(record)
            ));
            return self.missing();
        };

        match record.get("content") {
            None | Some(Value::Null) => self.missing(),
            Some(Value::Array(parts)) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                if texts.is_empty() {
                    Value::Array(parts.clone()).to_string()
                } else {
                    texts.join(" ")
                }
            }
            Some(value) => display_value(value),
        }
    }

    fn missing(&self) -> String {
        self.palette.missing.apply_to(NOT_AVAILABLE).to_string()
    }
}

impl TracingExporter for ConsoleExporter {
    fn name(&self) -> &str {
        "console"
    }

    fn export(&self, items: &[TraceItem]) -> Result<()> {
        let batch = self.render(items);

        {
            let mut writer = self.writer.lock();
            writer.write_all(batch.text.as_bytes())?;
            writer.flush()?;
        }

        if batch.malformed_items > 0 {
            return Err(Error::MalformedPayload {
                count: batch.malformed_items,
                detail: batch.problems.join("; "),
            });
        }
        Ok(())
    }
}

/// Output of rendering one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedBatch {
    /// Rendered lines, newline-terminated
    pub text: String,
    /// Number of items with at least one malformed field
    pub malformed_items: usize,
    /// One message per malformed field
    pub problems: Vec<String>,
}

struct Palette {
    header: Style,
    missing: Style,
    error: Style,
}

impl Palette {
    fn new(styled: bool) -> Self {
        Self {
            header: Style::new().cyan().bold().force_styling(styled),
            missing: Style::new().dim().force_styling(styled),
            error: Style::new().red().force_styling(styled),
        }
    }
}

fn item_id(item: &TraceItem) -> &str {
    match item {
        TraceItem::Trace(trace) => &trace.trace_id,
        TraceItem::Span(span) => &span.span_id,
    }
}

fn problem_detail(error: Error) -> String {
    match error {
        Error::MalformedPayload { detail, .. } => detail,
        other => other.to_string(),
    }
}

/// Strings print bare; everything else as compact JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentSpanData, CustomSpanData, HandoffSpanData};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn exporter() -> ConsoleExporter {
        exporter_with(ConsoleConfig {
            color: ColorChoice::Never,
            ..ConsoleConfig::default()
        })
    }

    fn exporter_with(config: ConsoleConfig) -> ConsoleExporter {
        ConsoleExporter::with_writer(config, io::sink())
    }

    fn trace(id: &str, name: &str) -> TraceItem {
        TraceItem::Trace(Trace {
            trace_id: id.to_string(),
            name: name.to_string(),
            group_id: None,
            metadata: None,
        })
    }

    fn generation(payload: Value) -> TraceItem {
        let mut raw = payload;
        raw["type"] = json!("generation");
        let span_data: SpanData = serde_json::from_value(raw).unwrap();
        TraceItem::Span(Span {
            span_id: "span_gen".to_string(),
            trace_id: "trace_1".to_string(),
            parent_id: None,
            started_at: None,
            ended_at: None,
            span_data,
            error: None,
        })
    }

    fn span(span_data: SpanData) -> TraceItem {
        TraceItem::Span(Span {
            span_id: "span_other".to_string(),
            trace_id: "trace_1".to_string(),
            parent_id: None,
            started_at: None,
            ended_at: None,
            span_data,
            error: None,
        })
    }

    fn render(items: &[TraceItem]) -> String {
        exporter().render(items).text
    }

    #[test]
    fn test_trace_line_contains_id_and_name() {
        let text = render(&[trace("trace_abc123", "Agent workflow")]);
        assert_eq!(text, "[Trace] ID: trace_abc123 | Name: Agent workflow\n");
    }

    #[test]
    fn test_generation_full() {
        let text = render(&[generation(json!({
            "model": "gemini-2.0-flash",
            "usage": {"input_tokens": 10, "output_tokens": 5},
            "input": [{"role": "user", "content": "Hello, how can you assist me today"}],
            "output": [{"role": "assistant", "content": "I can help with many things."}]
        }))]);

        assert_eq!(
            text,
            "🧠 Model Used: gemini-2.0-flash\n\
             📥 Input Tokens: 10\n\
             📤 Output Tokens: 5\n\
             🙋 User Asked: Hello, how can you assist me today\n\
             🤖 Bot Replied: I can help with many things.\n"
        );
    }

    #[rstest]
    #[case::empty_mapping(json!({}))]
    #[case::absent(Value::Null)]
    fn test_empty_usage_renders_placeholders(#[case] usage: Value) {
        let text = render(&[generation(json!({"model": "m", "usage": usage}))]);
        assert!(text.contains("📥 Input Tokens: N/A"));
        assert!(text.contains("📤 Output Tokens: N/A"));
    }

    #[test]
    fn test_partial_usage() {
        let text = render(&[generation(json!({"usage": {"output_tokens": 3}}))]);
        assert!(text.contains("🧠 Model Used: N/A"));
        assert!(text.contains("📥 Input Tokens: N/A"));
        assert!(text.contains("📤 Output Tokens: 3"));
    }

    #[test]
    fn test_last_input_wins() {
        let text = render(&[generation(json!({
            "input": [{"content": "a"}, {"content": "b"}]
        }))]);
        assert!(text.contains("🙋 User Asked: b"));
        assert!(!text.contains("User Asked: a"));
    }

    #[test]
    fn test_first_output_wins() {
        let text = render(&[generation(json!({
            "output": [{"content": "x"}, {"content": "y"}]
        }))]);
        assert!(text.contains("🤖 Bot Replied: x"));
        assert!(!text.contains("Bot Replied: y"));
    }

    #[test]
    fn test_empty_messages_omit_lines() {
        let text = render(&[generation(json!({"input": [], "output": []}))]);
        assert!(!text.contains("User Asked"));
        assert!(!text.contains("Bot Replied"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_record_without_content() {
        let text = render(&[generation(json!({
            "input": [{"role": "user"}],
            "output": [{"content": null}]
        }))]);
        assert!(text.contains("🙋 User Asked: N/A"));
        assert!(text.contains("🤖 Bot Replied: N/A"));
    }

    #[test]
    fn test_content_parts_are_joined() {
        let text = render(&[generation(json!({
            "output": [{"content": [
                {"type": "output_text", "text": "Hello"},
                {"type": "output_text", "text": "there"}
            ]}]
        }))]);
        assert!(text.contains("🤖 Bot Replied: Hello there"));
    }

    #[test]
    fn test_malformed_usage_degrades_and_reports() {
        let items = [
            generation(json!({"model": "m", "usage": "lots"})),
            trace("trace_2", "after"),
        ];
        let batch = exporter().render(&items);

        assert!(batch.text.contains("📥 Input Tokens: N/A"));
        assert!(batch.text.contains("[Trace] ID: trace_2 | Name: after"));
        assert_eq!(batch.malformed_items, 1);
        assert!(batch.problems[0].contains("usage must be a mapping"));
    }

    #[test]
    fn test_export_writes_everything_then_reports_malformed() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(
            ConsoleConfig {
                color: ColorChoice::Never,
                ..ConsoleConfig::default()
            },
            buffer.clone(),
        );

        let items = [
            trace("trace_1", "first"),
            generation(json!({"input": [42]})),
            trace("trace_3", "last"),
        ];
        let err = exporter.export(&items).unwrap_err();

        assert!(matches!(err, Error::MalformedPayload { count: 1, .. }));
        let text = buffer.contents();
        assert!(text.contains("🙋 User Asked: N/A"));
        assert!(text.ends_with("[Trace] ID: trace_3 | Name: last\n"));
    }

    #[test]
    fn test_export_ok_writes_to_writer() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(ConsoleConfig::default(), buffer.clone());

        exporter.export(&[trace("trace_9", "demo")]).unwrap();
        assert_eq!(buffer.contents(), "[Trace] ID: trace_9 | Name: demo\n");
    }

    #[test]
    fn test_unhandled_summary() {
        let items = [
            span(SpanData::Agent(AgentSpanData {
                name: "Assistant".to_string(),
                handoffs: Some(vec![]),
                tools: Some(vec!["search".to_string(), "calc".to_string()]),
                output_type: None,
            })),
            span(SpanData::Handoff(HandoffSpanData {
                from_agent: Some("triage".to_string()),
                to_agent: None,
            })),
            span(serde_json::from_value(json!({"type": "speech"})).unwrap()),
        ];
        let text = render(&items);
        assert_eq!(
            text,
            "[Span] agent | Name: Assistant | Tools: search, calc | ID: span_other\n\
             [Span] handoff | triage -> N/A | ID: span_other\n\
             [Span] speech | ID: span_other\n"
        );
    }

    #[test]
    fn test_unhandled_skip() {
        let exporter = exporter_with(ConsoleConfig {
            unhandled_spans: UnhandledSpanPolicy::Skip,
            color: ColorChoice::Never,
            ..ConsoleConfig::default()
        });
        let items = [
            span(SpanData::Custom(CustomSpanData {
                name: "step".to_string(),
                data: Map::new(),
            })),
            generation(json!({"model": "m"})),
        ];
        let text = exporter.render(&items).text;
        assert!(!text.contains("[Span]"));
        assert!(text.starts_with("🧠 Model Used: m\n"));
    }

    #[test]
    fn test_span_error_line() {
        let mut item = generation(json!({"model": "m"}));
        if let TraceItem::Span(span) = &mut item {
            span.set_error("rate limited", None);
        }
        let text = render(&[item.clone()]);
        assert!(text.ends_with("⚠️ Error: rate limited\n"));

        let quiet = exporter_with(ConsoleConfig {
            show_errors: false,
            color: ColorChoice::Never,
            ..ConsoleConfig::default()
        });
        assert!(!quiet.render(&[item]).text.contains("Error"));
    }

    #[test]
    fn test_styled_output_keeps_text() {
        let styled = exporter_with(ConsoleConfig {
            color: ColorChoice::Always,
            ..ConsoleConfig::default()
        });
        let text = styled.render(&[trace("trace_c", "colored")]).text;
        assert!(text.contains("\u{1b}["));
        assert!(text.contains("trace_c"));
        assert!(text.contains("colored"));
    }

    #[test]
    fn test_export_is_idempotent() {
        let buffer = SharedBuffer::default();
        let exporter = ConsoleExporter::with_writer(ConsoleConfig::default(), buffer.clone());
        let items = [
            trace("trace_1", "run"),
            generation(json!({"input": [{"content": "q"}], "output": [{"content": "a"}]})),
        ];

        exporter.export(&items).unwrap();
        let first = buffer.take();
        exporter.export(&items).unwrap();
        let second = buffer.take();

        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_batch_order_preserved(names in proptest::collection::vec("[a-z]{1,8}", 1..20)) {
            let items: Vec<TraceItem> = names
                .iter()
                .enumerate()
                .map(|(i, name)| trace(&format!("trace_{i}"), name))
                .collect();

            let text = render(&items);
            let lines: Vec<&str> = text.lines().collect();

            prop_assert_eq!(lines.len(), names.len());
            for (i, (line, name)) in lines.iter().zip(&names).enumerate() {
                let expected = format!("[Trace] ID: trace_{i} | Name: {name}");
                prop_assert_eq!(*line, expected.as_str());
            }
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }

        fn take(&self) -> String {
            String::from_utf8(std::mem::take(&mut *self.0.lock())).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
