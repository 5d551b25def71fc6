//! Bounded history of classified lookup failures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use warden_core::{Classification, ErrorKind, Severity, TransportError};

/// One classified failure, as surfaced through the debug snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    /// Zero-based attempt index within the lookup that failed.
    pub attempt: u32,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(error: &TransportError, classification: Classification, attempt: u32) -> Self {
        Self {
            kind: classification.kind,
            severity: classification.severity,
            retryable: classification.retryable,
            status: error.status_code(),
            message: error.to_string(),
            attempt,
            recorded_at: Utc::now(),
        }
    }
}

/// Ring buffer keeping the most recent failures. Oldest entries fall off.
#[derive(Debug, Clone)]
pub struct ErrorHistory {
    records: VecDeque<ErrorRecord>,
    capacity: usize,
    total: u64,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, record: ErrorRecord) {
        self.total = self.total.saturating_add(1);
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn record(&mut self, error: &TransportError, classification: Classification, attempt: u32) {
        self.push(ErrorRecord::new(error, classification, attempt));
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&ErrorRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Failures seen since the last clear, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.total = 0;
    }
}
