//! HTTP client implementing the remote store port

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use pocketsync_core::config::RemoteConfig;
use pocketsync_core::ports::remote_store::{Filter, IRemoteStore, RemoteError, Row};

/// Remote store adapter over a PostgREST-style HTTP API
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRemoteStore {
    /// Creates a client from the remote configuration
    pub fn new(config: &RemoteConfig) -> Self {
        Self::with_base_url(config.base_url.clone(), config.api_key.clone())
    }

    /// Creates a client against an explicit base URL. Used by tests to
    /// point at a mock server.
    pub fn with_base_url(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, format!("{}/{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header(AUTHORIZATION, format!("Bearer {key}"));
        }
        request
    }

    /// Renders a filter into a PostgREST query pair: `col=eq.value`
    fn filter_query(filter: &Filter) -> (String, String) {
        let value = match &filter.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        (filter.column.clone(), format!("eq.{value}"))
    }

    /// Classifies a non-success status into a `RemoteError`
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => RemoteError::UniqueViolation(message),
            StatusCode::TOO_MANY_REQUESTS => {
                RemoteError::Transient(format!("rate limited: {message}"))
            }
            s if s.is_server_error() => {
                RemoteError::Transient(format!("server error {}: {message}", s.as_u16()))
            }
            s => RemoteError::Rejected {
                status: s.as_u16(),
                message,
            },
        })
    }

    fn transport(err: reqwest::Error) -> RemoteError {
        RemoteError::Transient(err.to_string())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for HttpRemoteStore {
    async fn select_one(&self, table: &str, filter: &Filter) -> Result<Option<Row>, RemoteError> {
        let response = self
            .request(Method::GET, table)
            .query(&[Self::filter_query(filter), ("limit".into(), "1".into())])
            .send()
            .await
            .map_err(Self::transport)?;

        let rows: Vec<Row> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    async fn update(&self, table: &str, filter: &Filter, patch: &Row) -> Result<u64, RemoteError> {
        let response = self
            .request(Method::PATCH, table)
            .query(&[Self::filter_query(filter)])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await
            .map_err(Self::transport)?;

        // With return=representation the body is the set of patched rows,
        // which is how we learn whether the row existed at all.
        let rows: Vec<Row> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        debug!(table, affected = rows.len(), "Patched rows");
        Ok(rows.len() as u64)
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<(), RemoteError> {
        let response = self
            .request(Method::POST, table)
            .json(row)
            .send()
            .await
            .map_err(Self::transport)?;

        Self::check(response).await?;
        debug!(table, "Row inserted");
        Ok(())
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
    ) -> Result<String, RemoteError> {
        let response = self
            .request(Method::POST, &format!("storage/{bucket}/{path}"))
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(Self::transport)?;

        Self::check(response).await?;
        debug!(bucket, path, size = bytes.len(), "Blob uploaded");
        Ok(format!("{bucket}/{path}"))
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<mpsc::Receiver<Row>, RemoteError> {
        let response = self
            .request(Method::GET, &format!("{table}/stream"))
            .query(&[Self::filter_query(filter)])
            .send()
            .await
            .map_err(Self::transport)?;

        let mut response = Self::check(response).await?;
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut buffer: Vec<u8> = Vec::new();
            loop {
                match response.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=pos).collect();
                            if !forward_line(&line[..pos], &tx).await {
                                return;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "Change stream interrupted");
                        break;
                    }
                }
            }
            // A final row may arrive without a trailing newline
            let leftover = buffer;
            forward_line(&leftover, &tx).await;
            debug!("Change stream ended");
        });

        Ok(rx)
    }
}

/// Parses one NDJSON line and forwards it; returns false once the receiver
/// is gone
async fn forward_line(line: &[u8], tx: &mpsc::Sender<Row>) -> bool {
    let trimmed: Vec<u8> = line
        .iter()
        .copied()
        .filter(|b| *b != b'\r')
        .collect();
    if trimmed.iter().all(u8::is_ascii_whitespace) {
        return true;
    }

    match serde_json::from_slice::<Row>(&trimmed) {
        Ok(row) => tx.send(row).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "Skipping undecodable stream line");
            true
        }
    }
}
