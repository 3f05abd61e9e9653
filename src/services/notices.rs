use tokio::sync::broadcast;

use crate::models::{Notice, NoticeLevel};

/// Fan-out of toast-style notices to connected clients. Subscribers filter
/// flow-scoped notices with `Notice::is_visible_to`.
#[derive(Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<Notice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn publish(&self, level: NoticeLevel, message: impl Into<String>) {
        self.send(Notice::new(level, message));
    }

    /// Publishes a notice only the given booking flow's client sees.
    pub fn publish_to_flow(&self, flow_id: &str, level: NoticeLevel, message: impl Into<String>) {
        self.send(Notice::new(level, message).for_flow(flow_id));
    }

    fn send(&self, notice: Notice) {
        tracing::debug!(level = ?notice.level, message = %notice.message, flow_id = ?notice.flow_id, "notice");
        // nobody listening is fine
        let _ = self.tx.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NoticeLevel::Error, message);
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(256)
    }
}
