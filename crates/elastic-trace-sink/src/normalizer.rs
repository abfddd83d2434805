// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload normalization into serialized document fragments.
//!
//! Whatever shape of payload accompanies an event, normalization produces
//! valid serialized text for the document's `data` field. Faults along the
//! way are captured in a `FAILURE`-tagged fallback document; nothing here
//! panics or returns an error to the event's emitter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::error::Error as StdError;
use std::fmt;
use tracing::debug;

/// Payload shapes accepted alongside a trace event, dispatched by variant.
#[derive(Debug, Clone)]
pub enum TracePayload {
    /// An error value; its message replaces the event message and its
    /// structure (message plus cause chain) becomes the document.
    Error { message: String, causes: Vec<String> },
    /// A navigable XML tree, carried in its serialized text form.
    Xml(String),
    /// A timestamp value.
    Timestamp(DateTime<Utc>),
    /// Plain text.
    Text(String),
    /// A primitive/value type, rendered to its string form.
    Scalar(String),
    /// An arbitrary record reflected into a key/value document.
    Record(Value),
    /// Conversion already failed; carries the fallback fields.
    Failed {
        error: String,
        datatype: String,
        raw: String,
    },
}

impl TracePayload {
    /// Captures an error value's message and cause chain.
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = err.source();
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        TracePayload::Error {
            message: err.to_string(),
            causes,
        }
    }

    /// Reflects any serializable value into a record payload.
    ///
    /// A value that cannot be converted yields the `Failed` variant carrying
    /// the full error text, the value's type name and its debug rendering.
    #[must_use]
    pub fn record<T: Serialize + fmt::Debug>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(converted) => TracePayload::Record(converted),
            Err(err) => TracePayload::Failed {
                error: err.to_string(),
                datatype: std::any::type_name::<T>().to_string(),
                raw: format!("{value:?}"),
            },
        }
    }

    /// Wraps a primitive in its string form.
    #[must_use]
    pub fn scalar<T: ToString>(value: T) -> Self {
        TracePayload::Scalar(value.to_string())
    }
}

/// Result of normalizing a payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Replacement for the event message, when the payload carries one.
    pub message_override: Option<String>,
    /// Serialized fragment for the document's `data` field; empty when no
    /// payload was given.
    pub data: String,
}

/// Normalizes a payload into a serialized document fragment.
#[must_use]
pub fn normalize(payload: Option<TracePayload>) -> Normalized {
    let Some(payload) = payload else {
        return Normalized::default();
    };

    match payload {
        TracePayload::Error { message, causes } => {
            let mut doc = Map::new();
            doc.insert("message".to_string(), Value::String(message.clone()));
            if !causes.is_empty() {
                doc.insert("causes".to_string(), json!(causes));
            }
            Normalized {
                message_override: Some(message),
                data: Value::Object(doc).to_string(),
            }
        }
        TracePayload::Xml(text) => Normalized {
            message_override: None,
            data: xml_to_document(&text).to_string(),
        },
        TracePayload::Timestamp(ts) => Normalized {
            message_override: None,
            data: json!({ "timestamp": ts }).to_string(),
        },
        TracePayload::Text(value) => Normalized {
            message_override: None,
            data: json!({ "string": value }).to_string(),
        },
        TracePayload::Scalar(value) => Normalized {
            message_override: None,
            data: json!({ "data": value }).to_string(),
        },
        TracePayload::Record(value) => Normalized {
            message_override: None,
            data: value.to_string(),
        },
        TracePayload::Failed {
            error,
            datatype,
            raw,
        } => Normalized {
            message_override: None,
            data: json!({ "FAILURE": error, "datatype": datatype, "data": raw }).to_string(),
        },
    }
}

/// Converts serialized XML into a nested key/value tree: element names become
/// keys, repeated child names aggregate into arrays, attributes become keys
/// on their element. Unparseable input is recorded as an opaque string.
fn xml_to_document(text: &str) -> Value {
    match roxmltree::Document::parse(text) {
        Ok(doc) => {
            let root = doc.root_element();
            json!({ root.tag_name().name(): element_to_value(root) })
        }
        Err(err) => {
            debug!("recording malformed XML payload as opaque string: {err}");
            json!({ "data": text })
        }
    }
}

fn element_to_value(node: roxmltree::Node<'_, '_>) -> Value {
    let mut map = Map::new();

    for attr in node.attributes() {
        map.insert(attr.name().to_string(), Value::String(attr.value().to_string()));
    }

    for child in node.children().filter(roxmltree::Node::is_element) {
        let key = child.tag_name().name().to_string();
        let value = element_to_value(child);
        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }

    let text: String = node
        .children()
        .filter(roxmltree::Node::is_text)
        .filter_map(|child| child.text())
        .collect();
    let text = text.trim();

    if map.is_empty() {
        Value::String(text.to_string())
    } else {
        if !text.is_empty() {
            map.insert("#text".to_string(), Value::String(text.to_string()));
        }
        Value::Object(map)
    }
}
