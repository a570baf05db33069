//! Best-effort user notifications.
//!
//! Notifications are pushed after the owning transaction has committed.
//! Delivery is never awaited and a failure never undoes the committed change.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use capstone_core::types::{DbId, Timestamp};
use serde::Serialize;

use crate::ws::WsManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// An advisor was asked to supervise a pre-project.
    AdvisorSolicited,
    AdvisorAccepted,
    AdvisorRejected,
    /// The pre-project became a book.
    PromotedToBook,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub pre_project_id: DbId,
    pub pre_project_name: String,
    pub message: String,
    pub timestamp: Timestamp,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        pre_project_id: DbId,
        pre_project_name: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            pre_project_id,
            pre_project_name: pre_project_name.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: DbId, notification: &Notification);
}

/// Pushes notifications to the recipient's open WebSocket connections.
pub struct WsNotifier {
    ws_manager: Arc<WsManager>,
}

impl WsNotifier {
    pub fn new(ws_manager: Arc<WsManager>) -> Self {
        Self { ws_manager }
    }
}

#[async_trait]
impl Notifier for WsNotifier {
    async fn notify(&self, recipient: DbId, notification: &Notification) {
        let msg = serde_json::json!({
            "type": "notification",
            "payload": notification,
        });
        let delivered = self
            .ws_manager
            .send_to_user(recipient, Message::Text(msg.to_string().into()))
            .await;
        if delivered == 0 {
            tracing::debug!(
                recipient = %recipient,
                kind = ?notification.kind,
                "Recipient has no open connection, notification dropped"
            );
        }
    }
}

/// Notify each recipient in turn.
pub async fn notify_all(notifier: &dyn Notifier, recipients: &[DbId], notification: &Notification) {
    for &recipient in recipients {
        notifier.notify(recipient, notification).await;
    }
}
