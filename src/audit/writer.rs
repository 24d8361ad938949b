//! Per-agent queue files for lifecycle records.
//!
//! Each record lands in `<dir>/<agent>-YYYY-MM-DD.jsonl` as one JSON
//! object carrying the `queue:location:message` line a collector would
//! receive, plus the event type and collector address. The date comes
//! from the record's own timestamp, so a record is filed under the day it
//! was produced even if the write happens later.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::{AuditEntry, AuditEventType, AuditLogger};
use crate::config::AgentIdentity;
use crate::{AppError, Result};

/// On-disk shape of one record.
#[derive(Debug, Serialize)]
struct QueueLine<'a> {
    timestamp: DateTime<Utc>,
    agent: &'a str,
    event_type: &'a AuditEventType,
    record: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<&'a str>,
}

/// Appends formatted queue records to daily files named after the agent.
///
/// Lifecycle records are rare, so every write opens the day's file in
/// append mode and closes it again; a lock keeps lines from interleaving.
pub struct QueueFileWriter {
    dir: PathBuf,
    agent: String,
    file_stem: String,
    write_lock: Mutex<()>,
}

impl QueueFileWriter {
    /// Writer for `identity` storing files in `dir`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Audit`] if the directory cannot be created.
    pub fn new(dir: PathBuf, identity: &AgentIdentity) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|err| {
            AppError::Audit(format!("cannot create audit directory {}: {err}", dir.display()))
        })?;
        Ok(Self {
            dir,
            agent: identity.name.clone(),
            file_stem: file_stem(&identity.name),
            write_lock: Mutex::new(()),
        })
    }

    /// File that holds records produced on `date`.
    #[must_use]
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}-{date}.jsonl", self.file_stem))
    }

    fn render(&self, entry: &AuditEntry) -> Result<String> {
        let line = QueueLine {
            timestamp: entry.timestamp,
            agent: &self.agent,
            event_type: &entry.event_type,
            record: entry.formatted(),
            server: entry.server.as_deref(),
        };
        let mut json = serde_json::to_string(&line)
            .map_err(|err| AppError::Audit(format!("cannot encode audit record: {err}")))?;
        json.push('\n');
        Ok(json)
    }
}

impl AuditLogger for QueueFileWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let line = self.render(&entry)?;
        let path = self.file_for(entry.timestamp.date_naive());

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Audit("audit write lock poisoned".into()))?;

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|err| AppError::Audit(format!("cannot append to {}: {err}", path.display())))
    }
}

/// Agent name reduced to characters safe in a file name.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "agent".to_owned()
    } else {
        stem
    }
}
