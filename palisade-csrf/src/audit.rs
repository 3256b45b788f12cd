//! Audit log of failed CSRF validations

use crate::error::{CsrfError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use palisade_core::HttpRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One failed request. Parameter values are never recorded, only their names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackLogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub url: String,
    /// Failure action code that was dispatched
    pub action: u8,
    pub query_keys: Vec<String>,
    pub form_keys: Vec<String>,
}

impl AttackLogEntry {
    pub fn from_request(request: &HttpRequest, action: u8) -> Self {
        let mut query_keys: Vec<String> = request.query_params.keys().cloned().collect();
        let mut form_keys: Vec<String> = request.form_params.keys().cloned().collect();
        query_keys.sort();
        form_keys.sort();

        Self {
            timestamp: Utc::now(),
            method: request.method.clone(),
            url: request.current_url(),
            action,
            query_keys,
            form_keys,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Audit log storage backend trait
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry. Fails with [`CsrfError::LogDirectoryNotFound`] when
    /// the destination cannot be written.
    async fn append(&self, entry: &AttackLogEntry) -> Result<()>;
}

/// File-based audit log.
///
/// Writes one JSON object per line to `{directory}/{YYYY-MM-DD}.log`.
/// The directory is never created: a missing directory is a deployment
/// error and is reported as such.
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    directory: PathBuf,
}

impl FileAuditLog {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &PathBuf {
        &self.directory
    }

    /// File receiving entries written at `timestamp`
    pub fn file_for(&self, timestamp: &DateTime<Utc>) -> PathBuf {
        self.directory
            .join(format!("{}.log", timestamp.format("%Y-%m-%d")))
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&self, entry: &AttackLogEntry) -> Result<()> {
        let not_found = || CsrfError::LogDirectoryNotFound(self.directory.clone());

        match tokio::fs::metadata(&self.directory).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(not_found()),
        }

        let json = entry.to_json()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(&entry.timestamp))
            .await
            .map_err(|_| not_found())?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        Ok(())
    }
}

/// Memory backend for testing
#[derive(Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Vec<AttackLogEntry>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AttackLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: &AttackLogEntry) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
