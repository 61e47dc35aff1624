//! Ordered record of every payload the server received.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Append-only log of received payloads, shared by all handlers.
///
/// Payloads from one connection keep their receive order. Payloads from
/// different connections interleave in whatever order the handlers append.
#[derive(Clone, Default)]
pub struct MessageLog {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Mutex<Vec<String>>,
    appended: Notify,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a payload and return the new length of the log.
    pub async fn append(&self, payload: String) -> usize {
        let mut messages = self.inner.messages.lock().await;
        messages.push(payload);
        let len = messages.len();
        drop(messages);

        self.inner.appended.notify_waiters();
        len
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.inner.messages.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until the log holds at least `len` payloads, then return a snapshot.
    ///
    /// Pair with `tokio::time::timeout` when the payloads may never arrive.
    pub async fn wait_for_len(&self, len: usize) -> Vec<String> {
        loop {
            let notified = self.inner.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let messages = self.snapshot().await;
            if messages.len() >= len {
                return messages;
            }

            notified.await;
        }
    }
}
