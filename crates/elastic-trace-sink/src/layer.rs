// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` integration: a subscriber layer that forwards emitted events
//! into a running trace sink.

use crate::document::{HostContext, TraceDocument, TraceEventType};
use crate::normalizer::{normalize, TracePayload};
use crate::sink_service::TraceSinkHandle;
use serde_json::{Map, Value};
use std::fmt;
use tracing_core::field::{Field, Visit};
use tracing_core::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Converts every `tracing` event into a [`TraceDocument`] and enqueues it.
///
/// The event's target becomes the document source, its level maps onto the
/// severity, the `message` field becomes the message and the remaining
/// fields are normalized into the `data` payload.
pub struct ElasticLayer {
    handle: TraceSinkHandle,
    host: HostContext,
}

impl ElasticLayer {
    #[must_use]
    pub fn new(handle: TraceSinkHandle, host: HostContext) -> Self {
        ElasticLayer { handle, host }
    }
}

fn event_type_for(level: &Level) -> TraceEventType {
    match *level {
        Level::ERROR => TraceEventType::Error,
        Level::WARN => TraceEventType::Warning,
        Level::INFO => TraceEventType::Information,
        _ => TraceEventType::Verbose,
    }
}

impl<S: Subscriber> Layer<S> for ElasticLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        // The sink's own diagnostics must not feed back into the pipeline.
        if metadata.target().starts_with("elastic_trace_sink") {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut document = TraceDocument::new(
            &self.host,
            metadata.target(),
            event_type_for(metadata.level()),
            visitor.message.unwrap_or_default(),
        );
        if !visitor.fields.is_empty() {
            let normalized = normalize(Some(TracePayload::Record(Value::Object(visitor.fields))));
            document.data = normalized.data;
        }

        self.handle.enqueue(document);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{value:?}")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(event_type_for(&Level::ERROR), TraceEventType::Error);
        assert_eq!(event_type_for(&Level::WARN), TraceEventType::Warning);
        assert_eq!(event_type_for(&Level::INFO), TraceEventType::Information);
        assert_eq!(event_type_for(&Level::DEBUG), TraceEventType::Verbose);
        assert_eq!(event_type_for(&Level::TRACE), TraceEventType::Verbose);
    }
}
