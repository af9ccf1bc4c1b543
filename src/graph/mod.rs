//! HTTP client for the remote knowledge graph service.
//!
//! Every operation is an independent, cancellable request against a
//! single base URL. The client holds no session state beyond the
//! `reqwest::Client` connection pool; retries, if any, are the caller's
//! decision (the [`crate::coordinator`] and [`crate::clearing`] layers
//! above treat graph failures as non-fatal to their own local-store work).

mod filters;

pub use filters::{filter_by_ids, filter_by_name_pattern, filter_by_status};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Lifecycle status the remote service assigns to an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Fully indexed.
    Processed,
    /// Currently being indexed.
    Processing,
    /// Indexing failed.
    Failed,
    /// Queued, not yet started.
    Pending,
    /// The service reported a status string this client does not recognize.
    Unknown,
}

impl DocumentStatus {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processed" => Self::Processed,
            "processing" => Self::Processing,
            "failed" => Self::Failed,
            "pending" => Self::Pending,
            _ => Self::Unknown,
        }
    }
}

/// One document as tracked by the remote graph service. IDs are opaque;
/// the service owns the document lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Opaque document id.
    pub id: String,
    /// Source file path/identifier, as reported by the service.
    #[serde(default)]
    pub file_path: String,
    /// Current lifecycle status.
    #[serde(default = "default_unknown_status", deserialize_with = "deserialize_status")]
    pub status: DocumentStatus,
    /// Creation timestamp, if reported.
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_unknown_status() -> DocumentStatus {
    DocumentStatus::Unknown
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<DocumentStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(DocumentStatus::parse(&s))
}

/// Outcome of [`GraphClient::delete_documents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Whether deletion was accepted (`deletion_started`).
    pub accepted: bool,
    /// The raw status string the service reported.
    pub status: String,
    /// Any accompanying message.
    pub message: String,
}

/// Async HTTP client for the knowledge graph service.
#[derive(Clone)]
pub struct GraphClient {
    base_url: String,
    client: reqwest::Client,
}

impl GraphClient {
    /// Builds a client against `base_url` with the module's default
    /// per-call timeouts applied per request (not at the connection
    /// level, since operations have different timeout budgets).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /health`.
    pub async fn health(&self) -> bool {
        self.client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    /// `POST /documents/text` — ingest raw text as a new document.
    pub async fn ingest_text(&self, text: &str, document_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/documents/text"))
            .timeout(Duration::from_secs(60))
            .json(&json!({ "text": text, "document_id": document_id }))
            .send()
            .await
            .map_err(transient("ingest_text"))?;
        ensure_success(resp, "ingest_text").await.map(|_| ())
    }

    /// `POST /query` — mode-parameterized knowledge retrieval.
    pub async fn query(&self, query: &str, mode: &str, top_k: u32) -> Result<String> {
        let resp = self
            .client
            .post(self.url("/query"))
            .timeout(Duration::from_secs(60))
            .json(&json!({
                "query": query,
                "mode": mode,
                "top_k": top_k,
                "response_type": "Multiple Paragraphs",
            }))
            .send()
            .await
            .map_err(transient("query"))?;
        let body: serde_json::Value = ensure_success(resp, "query").await?;
        Ok(body
            .get("response")
            .or_else(|| body.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// `GET /documents` — tolerates the three response shapes the
    /// service is known to emit: `{statuses: {status: [doc,...]}}`,
    /// `{documents: [doc,...]}`, or a bare array.
    pub async fn list_documents(&self) -> Result<Vec<GraphDocument>> {
        let resp = self
            .client
            .get(self.url("/documents"))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(transient("list_documents"))?;
        let body: serde_json::Value = ensure_success(resp, "list_documents").await?;
        Ok(parse_documents_response(&body))
    }

    /// `DELETE /documents/delete_document`.
    pub async fn delete_documents(&self, ids: &[String], delete_source: bool) -> Result<DeleteOutcome> {
        let resp = self
            .client
            .delete(self.url("/documents/delete_document"))
            .timeout(Duration::from_secs(60))
            .json(&json!({ "doc_ids": ids, "delete_file": delete_source }))
            .send()
            .await
            .map_err(transient("delete_documents"))?;
        let body: serde_json::Value = ensure_success(resp, "delete_documents").await?;
        let status = body.get("status").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let message = body.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string();
        match status.as_str() {
            "deletion_started" => Ok(DeleteOutcome { accepted: true, status, message }),
            "busy" | "not_allowed" => Err(Error::Transient(format!(
                "delete_documents rejected: {status} ({message})"
            ))),
            _ => Ok(DeleteOutcome { accepted: false, status, message }),
        }
    }

    /// `POST /documents/clear_cache`.
    pub async fn clear_cache(&self) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/documents/clear_cache"))
            .timeout(Duration::from_secs(30))
            .json(&json!({ "modes": serde_json::Value::Null }))
            .send()
            .await
            .map_err(transient("clear_cache"))?;
        ensure_success(resp, "clear_cache").await.map(|_: serde_json::Value| ())
    }

    /// `POST /documents/scan` — requests the service rescan its inputs
    /// directory.
    pub async fn trigger_scan(&self) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/documents/scan"))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(transient("trigger_scan"))?;
        ensure_success(resp, "trigger_scan").await.map(|_: serde_json::Value| ())
    }

    /// `GET /graph/label/list`.
    pub async fn list_labels(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(self.url("/graph/label/list"))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(transient("list_labels"))?;
        ensure_success(resp, "list_labels").await
    }

    /// Deletes `ids` and triggers a rescan so the service reprocesses the
    /// underlying source file(s) for any that failed.
    pub async fn retry_documents(&self, ids: &[String]) -> Result<()> {
        self.delete_documents(ids, false).await?;
        self.trigger_scan().await
    }
}

fn parse_documents_response(body: &serde_json::Value) -> Vec<GraphDocument> {
    if let Some(statuses) = body.get("statuses").and_then(|v| v.as_object()) {
        return statuses
            .values()
            .filter_map(|v| v.as_array())
            .flatten()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
    }
    if let Some(documents) = body.get("documents").and_then(|v| v.as_array()) {
        return documents
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
    }
    if let Some(arr) = body.as_array() {
        return arr
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
    }
    Vec::new()
}

fn transient(operation: &'static str) -> impl Fn(reqwest::Error) -> Error {
    move |e| {
        tracing::warn!(operation, error = %e, "graph client request failed");
        Error::Transient(format!("{operation}: {e}"))
    }
}

async fn ensure_success<T: serde::de::DeserializeOwned>(resp: reqwest::Response, operation: &str) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        resp.json::<T>().await.map_err(|e| {
            Error::External {
                status: Some(status.as_u16()),
                body: format!("{operation}: failed to decode response: {e}"),
            }
        })
    } else {
        let body = resp.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(Error::Transient(format!("{operation}: {status} {body}")))
        } else {
            Err(Error::External { status: Some(status.as_u16()), body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_statuses_shape() {
        let body = json!({
            "statuses": {
                "processed": [{"id": "a", "file_path": "a.md", "status": "processed"}],
                "failed": [{"id": "b", "file_path": "b.md", "status": "failed"}],
            }
        });
        let docs = parse_documents_response(&body);
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn parses_documents_shape() {
        let body = json!({ "documents": [{"id": "a", "file_path": "a.md", "status": "processed"}] });
        assert_eq!(parse_documents_response(&body).len(), 1);
    }

    #[test]
    fn parses_bare_array_shape() {
        let body = json!([{"id": "a", "file_path": "a.md", "status": "pending"}]);
        assert_eq!(parse_documents_response(&body).len(), 1);
    }
}
