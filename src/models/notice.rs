use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// Transient, toast-style message pushed to connected clients.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: String,
    /// Booking flow the notice belongs to. Unscoped notices go to everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            flow_id: None,
        }
    }

    pub fn for_flow(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    /// Whether a client following `flow_id` (or no flow) should see this.
    pub fn is_visible_to(&self, flow_id: Option<&str>) -> bool {
        match self.flow_id.as_deref() {
            None => true,
            Some(scope) => flow_id == Some(scope),
        }
    }
}
