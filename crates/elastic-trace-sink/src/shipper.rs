// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget delivery of batches to the backend.

use crate::config::SinkConfig;
use crate::document::TraceDocument;
use crate::elastic::{EsApi, ShippingError};
use crate::error::SinkError;
use crate::index_name::{resolve_index_name, RotationGranularity};
use crate::sink_service::SinkStats;
use chrono::{DateTime, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Ships batches with one bulk call each, resolving the target index at ship
/// time. Failures are logged and the batch is dropped; nothing is retried or
/// surfaced to the emitting application.
pub struct BulkShipper {
    api: EsApi,
    index_prefix: String,
    rotation: RotationGranularity,
    inflight: Semaphore,
    stats: Arc<SinkStats>,
}

impl BulkShipper {
    pub fn new(config: &SinkConfig, stats: Arc<SinkStats>) -> Result<Self, SinkError> {
        Ok(BulkShipper {
            api: EsApi::new(config)?,
            index_prefix: config.index_prefix.clone(),
            rotation: config.rotation,
            inflight: Semaphore::new(config.max_inflight_ships),
            stats,
        })
    }

    /// Sends one batch. Batches beyond the in-flight cap are dropped and
    /// counted rather than queued, so a slow backend cannot accumulate
    /// unbounded concurrent requests.
    pub async fn ship(&self, batch: Vec<TraceDocument>) {
        if batch.is_empty() {
            return;
        }

        let Ok(_permit) = self.inflight.try_acquire() else {
            self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
            error!(
                "too many in-flight bulk requests, dropping batch of {} documents",
                batch.len()
            );
            return;
        };

        let body = match build_bulk_body(&batch, &self.index_prefix, self.rotation, Utc::now()) {
            Ok(body) => body,
            Err(e) => {
                self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
                error!("failed to build bulk request, dropping batch: {e}");
                return;
            }
        };

        debug!("shipping batch of {} documents", batch.len());
        match self.api.bulk_index(body).await {
            Ok(_) => debug!("successfully shipped {} documents", batch.len()),
            Err(e) => {
                self.stats.dropped_batches.fetch_add(1, Ordering::Relaxed);
                error!(
                    "failed to ship batch of {} documents: {:?}",
                    batch.len(),
                    e
                );
            }
        }
    }

    /// Single-document path for low-volume/immediate writes, with the same
    /// catch-and-log failure policy as the bulk path.
    pub async fn ship_one(&self, document: TraceDocument) {
        let index = resolve_index_name(&self.index_prefix, Utc::now(), self.rotation);
        match self.api.index_one(&index, &document).await {
            Ok(_) => debug!("successfully indexed document into {index}"),
            Err(e) => error!("failed to index document: {:?}", e),
        }
    }
}

/// Builds the NDJSON bulk body: per document, one index-action line carrying
/// the index name resolved for that document, then the document itself.
fn build_bulk_body(
    batch: &[TraceDocument],
    prefix: &str,
    rotation: RotationGranularity,
    now: DateTime<Utc>,
) -> Result<String, ShippingError> {
    let mut body = String::with_capacity(batch.len() * 512);
    for document in batch {
        let index = resolve_index_name(prefix, now, rotation);
        let action = serde_json::json!({ "index": { "_index": index } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(document).map_err(|e| {
            ShippingError::Payload(format!("failed to serialize document: {e}"))
        })?);
        body.push('\n');
    }
    Ok(body)
}
