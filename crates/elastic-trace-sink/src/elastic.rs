// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport against the Elasticsearch document APIs.

use crate::config::SinkConfig;
use crate::document::TraceDocument;
use crate::error::SinkError;
use reqwest::{Response, StatusCode};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    /// The request body could not be built; the data is malformed and is
    /// dropped without retry.
    #[error("{0}")]
    Payload(String),
    /// The transport or the backend rejected the request.
    #[error("{1}")]
    Destination(Option<StatusCode>, String),
}

/// Client for the backend's single-document and bulk index operations.
#[derive(Debug, Clone)]
pub struct EsApi {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl EsApi {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.flush_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)))
            .build()
            .map_err(|e| SinkError::HttpClient(e.to_string()))?;

        Ok(EsApi {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Single-document write: `POST <endpoint>/<index>/_doc`.
    pub async fn index_one(
        &self,
        index: &str,
        document: &TraceDocument,
    ) -> Result<Response, ShippingError> {
        let body = serde_json::to_vec(document)
            .map_err(|e| ShippingError::Payload(format!("failed to serialize document: {e}")))?;
        self.post(
            format!("{}/{}/_doc", self.endpoint, index),
            body,
            "application/json",
        )
        .await
    }

    /// Bulk write: `POST <endpoint>/_bulk` with an NDJSON body of action
    /// metadata and document pairs.
    pub async fn bulk_index(&self, body: String) -> Result<Response, ShippingError> {
        self.post(
            format!("{}/_bulk", self.endpoint),
            body.into_bytes(),
            "application/x-ndjson",
        )
        .await
    }

    async fn post(
        &self,
        url: String,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<Response, ShippingError> {
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", content_type)
            .body(body);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ShippingError::Destination(None, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(ShippingError::Destination(
                Some(status),
                format!("backend returned {status}"),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HostContext, TraceEventType};

    fn test_config(endpoint: &str) -> SinkConfig {
        SinkConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    fn test_document() -> TraceDocument {
        TraceDocument::new(
            &HostContext::default(),
            "billing",
            TraceEventType::Information,
            "charge accepted",
        )
    }

    #[tokio::test]
    async fn test_index_one_posts_to_doc_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/trace-2024-05/_doc")
            .match_header("Content-Type", "application/json")
            .with_status(201)
            .create_async()
            .await;

        let api = EsApi::new(&test_config(&server.url())).unwrap();
        let result = api.index_one("trace-2024-05", &test_document()).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bulk_index_posts_ndjson() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_bulk")
            .match_header("Content-Type", "application/x-ndjson")
            .with_status(200)
            .create_async()
            .await;

        let api = EsApi::new(&test_config(&server.url())).unwrap();
        let result = api
            .bulk_index("{\"index\":{\"_index\":\"trace-2024-05\"}}\n{}\n".to_string())
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_header_sent_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/_bulk")
            .match_header("Authorization", mockito::Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .create_async()
            .await;

        let config = SinkConfig {
            endpoint: server.url(),
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            ..Default::default()
        };
        let api = EsApi::new(&config).unwrap();
        let result = api.bulk_index("{}\n".to_string()).await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_becomes_destination_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/_bulk")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let api = EsApi::new(&test_config(&server.url())).unwrap();
        let result = api.bulk_index("{}\n".to_string()).await;

        match result {
            Err(ShippingError::Destination(Some(status), _)) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            }
            other => panic!("expected destination error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_becomes_destination_error() {
        // Reserved port with nothing listening.
        let api = EsApi::new(&test_config("http://127.0.0.1:9")).unwrap();
        let result = api.bulk_index("{}\n".to_string()).await;
        assert!(matches!(result, Err(ShippingError::Destination(None, _))));
    }
}
