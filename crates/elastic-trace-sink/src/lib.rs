// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batched, non-blocking shipping of structured trace events to an
//! Elasticsearch-compatible backend.
//!
//! Events are handed off on an unbounded channel, grouped into batches by a
//! time window and a size cap, and forwarded with bulk requests against a
//! rotating index. Delivery is best effort: a backend failure is logged
//! locally and the affected batch is dropped, the emitting application never
//! observes it.
//!
//! ```rust,ignore
//! use elastic_trace_sink::{HostContext, SinkConfig, TraceDocument, TraceEventType, TraceSink};
//!
//! let (service, handle) = TraceSink::new(SinkConfig::default())?;
//! tokio::spawn(service.run());
//!
//! let host = HostContext::detect();
//! handle.enqueue(TraceDocument::new(&host, "billing", TraceEventType::Error, "charge failed"));
//!
//! handle.flush().await?;
//! handle.shutdown();
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod document;
pub mod elastic;
pub mod error;
pub mod index_name;
pub mod layer;
pub mod normalizer;
pub mod shipper;
pub mod sink_service;

pub use config::SinkConfig;
pub use document::{HostContext, TraceDocument, TraceEventType};
pub use error::SinkError;
pub use index_name::{resolve_index_name, RotationGranularity};
pub use layer::ElasticLayer;
pub use normalizer::{normalize, Normalized, TracePayload};
pub use sink_service::{TraceSink, TraceSinkHandle};
