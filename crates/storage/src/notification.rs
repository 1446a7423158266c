//! Import notifications

use anyhow::Result;
use async_trait::async_trait;
use common::CaseEvent;
use tokio::sync::broadcast;
use tracing::info;

/// Receives one event per successful import or duplicate
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &CaseEvent) -> Result<()>;
}

/// Emits events as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn publish(&self, event: &CaseEvent) -> Result<()> {
        info!(
            case_id = %event.case_id,
            filename = %event.original_filename,
            format = %event.format,
            "Case imported"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<CaseEvent>,
}

impl BroadcastNotificationSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn publish(&self, event: &CaseEvent) -> Result<()> {
        // no subscriber is not a failure
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
