use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use registry::ConnectionId;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("connection {0} is not open")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} already has a private reader")]
    AlreadyRedirected(ConnectionId),

    #[error("connection {0} closed while waiting for input")]
    Closed(ConnectionId),

    #[error("no input from {0} before the deadline")]
    Timeout(ConnectionId),
}

/// A line waiting in the shared dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLine {
    pub conn: ConnectionId,
    pub text: String,
}

#[derive(Debug, Default)]
struct ConnectionInbox {
    /// `Some` while a private reader owns this connection's input.
    private: Mutex<Option<VecDeque<String>>>,
    ready: Notify,
    closed: AtomicBool,
}

/// Routes each connection's input lines either to the shared dispatch queue
/// or, while redirected, to a private queue read by one interactive flow.
#[derive(Debug, Default)]
pub struct InputRouter {
    inboxes: Mutex<HashMap<ConnectionId, Arc<ConnectionInbox>>>,
    shared: Mutex<VecDeque<InboundLine>>,
    shared_ready: Notify,
}

impl InputRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the inbox for a freshly accepted connection.
    pub fn open(&self, conn: ConnectionId) {
        let mut inboxes = self.inboxes.lock();
        if inboxes.insert(conn, Arc::new(ConnectionInbox::default())).is_some() {
            tracing::warn!(%conn, "inbox reopened, previous one discarded");
        }
    }

    /// Destroy a connection's inbox. Pending shared lines for it are dropped
    /// and any private reader wakes up with [`RouterError::Closed`].
    pub fn close(&self, conn: ConnectionId) {
        let Some(inbox) = self.inboxes.lock().remove(&conn) else {
            return;
        };
        inbox.closed.store(true, Ordering::Release);
        inbox.ready.notify_waiters();
        inbox.ready.notify_one();

        let mut shared = self.shared.lock();
        let before = shared.len();
        shared.retain(|line| line.conn != conn);
        let dropped = before - shared.len();
        if dropped > 0 {
            tracing::debug!(%conn, dropped, "discarded queued input of closed connection");
        }
    }

    pub fn is_open(&self, conn: ConnectionId) -> bool {
        self.inboxes.lock().contains_key(&conn)
    }

    /// Route one received line. Returns false if the connection has no inbox.
    pub fn push(&self, conn: ConnectionId, text: impl Into<String>) -> bool {
        let Some(inbox) = self.inboxes.lock().get(&conn).cloned() else {
            tracing::debug!(%conn, "input for unknown connection dropped");
            return false;
        };
        let text = text.into();

        {
            let mut private = inbox.private.lock();
            if let Some(queue) = private.as_mut() {
                queue.push_back(text);
                drop(private);
                inbox.ready.notify_one();
                return true;
            }
        }

        self.shared.lock().push_back(InboundLine { conn, text });
        self.shared_ready.notify_one();
        true
    }

    /// Pop up to `n` lines from the shared queue, oldest first.
    pub fn pop_shared(&self, n: usize) -> Vec<InboundLine> {
        let mut shared = self.shared.lock();
        let take = n.min(shared.len());
        shared.drain(..take).collect()
    }

    pub fn shared_len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Resolves once a line has been pushed to the shared queue since the
    /// last wake-up. Callers should re-check with [`pop_shared`](Self::pop_shared).
    pub async fn wait_for_input(&self) {
        self.shared_ready.notified().await;
    }

    /// Take over a connection's input. Until the returned guard is dropped,
    /// lines from `conn` bypass the shared queue.
    pub fn redirect(&self, conn: ConnectionId) -> Result<PrivateInput, RouterError> {
        let inbox = self
            .inboxes
            .lock()
            .get(&conn)
            .cloned()
            .ok_or(RouterError::UnknownConnection(conn))?;

        let mut private = inbox.private.lock();
        if private.is_some() {
            return Err(RouterError::AlreadyRedirected(conn));
        }
        *private = Some(VecDeque::new());
        drop(private);

        tracing::trace!(%conn, "input redirected to private reader");
        Ok(PrivateInput { conn, inbox })
    }
}

/// Exclusive reader of one connection's input. Dropping it hands the
/// connection back to the shared queue; unread lines are discarded.
#[derive(Debug)]
pub struct PrivateInput {
    conn: ConnectionId,
    inbox: Arc<ConnectionInbox>,
}

impl PrivateInput {
    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Wait for the next line, up to `timeout`.
    pub async fn next_line(&self, timeout: Duration) -> Result<String, RouterError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inbox.ready.notified();
            if self.inbox.closed.load(Ordering::Acquire) {
                return Err(RouterError::Closed(self.conn));
            }
            let line = self.inbox.private.lock().as_mut().and_then(|q| q.pop_front());
            if let Some(line) = line {
                return Ok(line);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(RouterError::Timeout(self.conn));
            }
        }
    }
}

impl Drop for PrivateInput {
    fn drop(&mut self) {
        if let Some(unread) = self.inbox.private.lock().take() {
            if !unread.is_empty() {
                tracing::debug!(conn = %self.conn, unread = unread.len(), "private input released with unread lines");
            }
        }
    }
}
