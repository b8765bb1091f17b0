//! In-memory queue for tests and offline use.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use capa_core::{QueueError, QueueHeader, QueueReply, XQueue};

/// A submission captured by [`MockQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSubmission {
    pub header: QueueHeader,
    pub body: String,
}

/// Accepts every submission without grading it.
///
/// Replies with a fixed acknowledgement and keeps what was sent so callers
/// can later post a result for the recorded key.
pub struct MockQueue {
    reply: QueueReply,
    call_count: AtomicU32,
    submissions: Mutex<Vec<QueuedSubmission>>,
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::with_reply(QueueReply::ok("Successfully queued"))
    }
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that always answers with `reply`.
    pub fn with_reply(reply: QueueReply) -> Self {
        Self {
            reply,
            call_count: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn submissions(&self) -> Vec<QueuedSubmission> {
        self.submissions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn last_submission(&self) -> Option<QueuedSubmission> {
        self.submissions().pop()
    }
}

#[async_trait]
impl XQueue for MockQueue {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_to_queue(&self, header: &QueueHeader, body: &str) -> Result<QueueReply, QueueError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut submissions) = self.submissions.lock() {
            submissions.push(QueuedSubmission {
                header: header.clone(),
                body: body.to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}
