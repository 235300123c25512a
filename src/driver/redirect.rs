use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// One network response observed in a browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRecord {
    pub url: String,
    pub status: u16,
    pub location: Option<String>,
}

impl RedirectRecord {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Append-only log of the responses seen by one session.
///
/// Clones share the same log; a new session gets a fresh tracker. A view
/// made with [`RedirectTracker::from_now`] shares the log too but only reads
/// records appended after it was taken.
#[derive(Debug, Clone, Default)]
pub struct RedirectTracker {
    records: Arc<Mutex<Vec<RedirectRecord>>>,
    start: usize,
}

impl RedirectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, url: &str, status: u16, location: Option<String>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(RedirectRecord {
                url: url.to_string(),
                status,
                location,
            });
        }
    }

    /// A view of this log that starts after the records already present.
    pub fn from_now(&self) -> RedirectTracker {
        let len = self.records.lock().map(|r| r.len()).unwrap_or(0);
        RedirectTracker {
            records: self.records.clone(),
            start: len,
        }
    }

    pub fn snapshot(&self) -> Vec<RedirectRecord> {
        self.records
            .lock()
            .map(|r| r.get(self.start..).map(|tail| tail.to_vec()).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn redirects(&self) -> Vec<RedirectRecord> {
        self.snapshot()
            .into_iter()
            .filter(RedirectRecord::is_redirect)
            .collect()
    }

    /// Human-readable chain, e.g. `302 /old -> /new`.
    pub fn describe(&self) -> String {
        let redirects = self.redirects();
        if redirects.is_empty() {
            return "no redirects observed".to_string();
        }
        redirects
            .iter()
            .map(|r| {
                format!(
                    "{} {} -> {}",
                    r.status,
                    r.url,
                    r.location.as_deref().unwrap_or("?")
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
