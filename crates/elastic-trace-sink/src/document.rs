// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The canonical record shipped to the backend for one diagnostic event.

use crate::normalizer::{normalize, TracePayload};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::env;
use std::sync::OnceLock;
use std::time::Instant;

/// Severity/category of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceEventType {
    Critical,
    Error,
    Warning,
    Information,
    Verbose,
    Start,
    Stop,
    Suspend,
    Resume,
    Transfer,
}

/// Host and user identity captured once at sink construction.
///
/// Injected into every document instead of being read from ambient process
/// state inside the normalizer, so tests can substitute fixed values.
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    pub machine_name: String,
    pub process_context: String,
    pub username: String,
    pub identity_name: String,
}

impl HostContext {
    /// Detect identity from the environment.
    ///
    /// Hostname lookup order: `ES_TRACE_HOSTNAME` override, then the standard
    /// `HOSTNAME` variable, then a fixed fallback.
    #[must_use]
    pub fn detect() -> Self {
        let machine_name = env::var("ES_TRACE_HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .or_else(|| env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| "unknown".to_string());

        let process_context = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        let user = env::var("USER")
            .or_else(|_| env::var("USERNAME"))
            .unwrap_or_default();
        let domain = env::var("USERDOMAIN").unwrap_or_default();
        let username = if domain.is_empty() {
            user
        } else {
            format!("{domain}\\{user}")
        };

        HostContext {
            machine_name,
            process_context,
            username,
            identity_name: String::new(),
        }
    }
}

/// Canonical normalized record for one diagnostic event.
///
/// Every field carries a defined default rather than being left unset;
/// correlation ids are empty strings when absent, never null. Immutable once
/// built: it is created here, passed by value through the queue and batcher,
/// and consumed exactly once by the shipper.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDocument {
    pub source: String,
    pub trace_id: i64,
    pub event_type: TraceEventType,
    pub utc_timestamp: DateTime<Utc>,
    pub high_res_timestamp: u64,
    pub machine_name: String,
    pub process_id: u32,
    pub process_context: String,
    pub thread_name: String,
    pub thread_id: String,
    pub message: String,
    pub activity_id: String,
    pub related_activity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_operation_stack: Option<String>,
    pub data: String,
    pub username: String,
    pub identity_name: String,
}

/// Monotonic nanoseconds since the first document was recorded, for
/// sub-timestamp ordering within a process.
fn high_res_now() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

impl TraceDocument {
    #[must_use]
    pub fn new(
        host: &HostContext,
        source: impl Into<String>,
        event_type: TraceEventType,
        message: impl Into<String>,
    ) -> Self {
        let thread = std::thread::current();
        let thread_id = format!("{:?}", thread.id());
        let thread_name = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| thread_id.clone());

        TraceDocument {
            source: source.into(),
            trace_id: 0,
            event_type,
            utc_timestamp: Utc::now(),
            high_res_timestamp: high_res_now(),
            machine_name: host.machine_name.clone(),
            process_id: std::process::id(),
            process_context: host.process_context.clone(),
            thread_name,
            thread_id,
            message: message.into(),
            activity_id: String::new(),
            related_activity_id: String::new(),
            logical_operation_stack: None,
            data: String::new(),
            username: host.username.clone(),
            identity_name: host.identity_name.clone(),
        }
    }

    /// Caller-supplied correlation/event id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: i64) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Correlation identifiers for causally linked operations.
    #[must_use]
    pub fn with_activity_ids(
        mut self,
        activity_id: impl Into<String>,
        related_activity_id: impl Into<String>,
    ) -> Self {
        self.activity_id = activity_id.into();
        self.related_activity_id = related_activity_id.into();
        self
    }

    /// Snapshot of the caller's nested-operation stack, comma-joined.
    #[must_use]
    pub fn with_operation_stack(mut self, operations: &[&str]) -> Self {
        self.logical_operation_stack = if operations.is_empty() {
            None
        } else {
            Some(operations.join(", "))
        };
        self
    }

    /// Attach a normalized payload. An error payload replaces the message
    /// with the error's own; normalization faults land in `data` as the
    /// fallback document, never as a propagated error.
    #[must_use]
    pub fn with_payload(mut self, payload: TracePayload) -> Self {
        let normalized = normalize(Some(payload));
        if let Some(message) = normalized.message_override {
            self.message = message;
        }
        self.data = normalized.data;
        self
    }
}
