use crate::domain::notification::Notification;
use crate::domain::ports::Notifier;
use crate::error::{Result, UnlockError};
use async_trait::async_trait;

/// Emits every notification as a structured log event.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let payload = serde_json::to_string(&notification)
            .map_err(|e| UnlockError::internal(format!("Serialization error: {e}")))?;
        tracing::info!(target: "unlock_engine::notifications", audience = ?notification.audience(), %payload, "Notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::Audience;

    #[tokio::test]
    async fn test_tracing_notifier_accepts_every_event() {
        let notification = Notification::DealCodeIssued {
            user_id: "guest-1".to_string(),
            code: "ABCD2345".to_string(),
            source_property_id: "prop-1".to_string(),
        };
        assert_eq!(notification.audience(), Audience::Guest);
        assert!(TracingNotifier.notify(notification).await.is_ok());
    }
}
