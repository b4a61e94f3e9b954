//! Append-only log of structured agent messages for one session, with
//! typed views for "latest implementation" and "role-tagged history"
//! (spec.md §4.3).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use aav3_core::{AppError, Implementation, Message, MessageRole};

/// The in-memory append-only log, write-through to `conversation.jsonl`.
pub struct SharedMemory {
    messages: Vec<Message>,
    log_path: PathBuf,
}

impl SharedMemory {
    /// Open (creating if absent) the conversation log at `log_path`. Any
    /// existing lines are replayed into memory so a resumed session sees
    /// prior history.
    pub fn open(log_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let log_path = log_path.into();
        let mut messages = Vec::new();
        if log_path.exists() {
            let contents = std::fs::read_to_string(&log_path).map_err(|e| AppError::FilesystemError {
                path: log_path.display().to_string(),
                reason: e.to_string(),
            })?;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                if let Ok(msg) = serde_json::from_str::<Message>(line) {
                    messages.push(msg);
                }
            }
        }
        Ok(Self { messages, log_path })
    }

    /// Push `message` to the end of the log, enforcing a monotonically
    /// non-decreasing timestamp, and write it through to the log file
    /// before returning.
    pub fn append(&mut self, mut message: Message) -> Result<(), AppError> {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }

        let line = serde_json::to_string(&message).map_err(|e| AppError::FilesystemError {
            path: self.log_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| AppError::FilesystemError {
                path: self.log_path.display().to_string(),
                reason: e.to_string(),
            })?;
        writeln!(file, "{line}").map_err(|e| AppError::FilesystemError {
            path: self.log_path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            from = %message.from_agent,
            role = %message.role,
            "appended message to shared memory"
        );
        self.messages.push(message);
        Ok(())
    }

    /// Read-only view over the log, newest-`last_n` and/or role-filtered.
    /// Order is preserved (oldest first).
    pub fn history(&self, last_n: Option<usize>, roles: Option<&[MessageRole]>) -> Vec<&Message> {
        let filtered: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| roles.is_none_or(|rs| rs.contains(&m.role)))
            .collect();

        match last_n {
            Some(n) if n < filtered.len() => filtered[filtered.len() - n..].to_vec(),
            _ => filtered,
        }
    }

    /// The most recent message with role = implementation, decoded back
    /// into the typed `Implementation`.
    pub fn latest_implementation(&self) -> Option<Implementation> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Implementation)
            .and_then(|m| serde_json::from_value(m.content.clone()).ok())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}
