// PendingFileRequests: correlation table for engine file requests awaiting an answer
// Bounded so a silent control plane cannot grow it without limit

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::engine::events::{FileCallbackOpcode, FileRequest, FileRequestTicket};

struct PendingEntry {
    request: FileRequest,
    reply: oneshot::Sender<Option<String>>,
    created: Instant,
}

/// Listing row for one outstanding request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFileSummary {
    pub id: u64,
    pub opcode: FileCallbackOpcode,
    pub is_dir: bool,
    pub title: String,
    pub filter: String,
    pub age_ms: u64,
}

pub struct PendingFileRequests {
    capacity: usize,
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, PendingEntry>>,
}

impl PendingFileRequests {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(1),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    /// Register a request and hand back the engine's ticket.
    ///
    /// Returns `None` when the table is full. Requests whose ticket the engine
    /// has dropped no longer count against the capacity.
    pub fn register(&self, request: &FileRequest) -> Option<FileRequestTicket> {
        let mut waiting = self.waiting.lock().ok()?;
        let before = waiting.len();
        waiting.retain(|_, entry| !entry.reply.is_closed());
        if waiting.len() < before {
            log::debug!(
                "[PendingFileRequests] pruned {} abandoned request(s)",
                before - waiting.len()
            );
        }
        if waiting.len() >= self.capacity {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        waiting.insert(
            id,
            PendingEntry {
                request: request.clone(),
                reply: tx,
                created: Instant::now(),
            },
        );
        Some(FileRequestTicket::pending(id, rx))
    }

    /// Answer request `id`. `None` means "no file chosen".
    ///
    /// Returns false when no such request is outstanding.
    pub fn resolve(&self, id: u64, answer: Option<String>) -> bool {
        let entry = match self.waiting.lock() {
            Ok(mut waiting) => waiting.remove(&id),
            Err(_) => None,
        };
        match entry {
            Some(entry) => {
                // the engine may have dropped its ticket already
                let _ = entry.reply.send(answer);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outstanding requests, oldest first.
    pub fn list(&self) -> Vec<PendingFileSummary> {
        let mut rows: Vec<PendingFileSummary> = match self.waiting.lock() {
            Ok(waiting) => waiting
                .iter()
                .map(|(id, entry)| PendingFileSummary {
                    id: *id,
                    opcode: entry.request.opcode,
                    is_dir: entry.request.is_dir,
                    title: entry.request.title.clone(),
                    filter: entry.request.filter.clone(),
                    age_ms: entry.created.elapsed().as_millis() as u64,
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        rows.sort_by_key(|row| row.id);
        rows
    }

    /// Answer every outstanding request with "no file". Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingEntry> = match self.waiting.lock() {
            Ok(mut waiting) => waiting.drain().map(|(_, entry)| entry).collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry.reply.send(None);
        }
        count
    }
}
