use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::db::queries;
use crate::models::{NewNotification, Notification};
use crate::services::messaging::MessagingProvider;

/// Where lifecycle notifications go. Delivery is best-effort: callers log a
/// failure and carry on.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: NewNotification) -> anyhow::Result<()>;
}

/// Persists notifications, publishes them on the realtime feed and, when a
/// messaging provider is configured, forwards them as SMS.
pub struct StoreNotificationSink {
    db: Arc<Mutex<Connection>>,
    feed: broadcast::Sender<Notification>,
    messaging: Option<Arc<dyn MessagingProvider>>,
}

impl StoreNotificationSink {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        feed: broadcast::Sender<Notification>,
        messaging: Option<Arc<dyn MessagingProvider>>,
    ) -> Self {
        Self {
            db,
            feed,
            messaging,
        }
    }
}

impl NotificationSink for StoreNotificationSink {
    fn notify(&self, notification: NewNotification) -> anyhow::Result<()> {
        let (stored, phone) = {
            let db = self
                .db
                .lock()
                .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
            let stored = queries::insert_notification(&db, &notification)?;
            let phone = match &self.messaging {
                Some(_) => queries::get_user(&db, &notification.user_id)?.and_then(|u| u.phone),
                None => None,
            };
            (stored, phone)
        };

        // No subscribers is fine.
        let _ = self.feed.send(stored.clone());

        if let (Some(messaging), Some(phone)) = (self.messaging.clone(), phone) {
            forward_sms(messaging, phone, &stored);
        }

        Ok(())
    }
}

fn forward_sms(messaging: Arc<dyn MessagingProvider>, phone: String, notification: &Notification) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(notification_id = notification.id, "no runtime, skipping SMS forward");
        return;
    };

    let text = format!("{}: {}", notification.title, notification.body);
    let notification_id = notification.id;
    runtime.spawn(async move {
        if let Err(e) = messaging.send_message(&phone, &text).await {
            tracing::warn!(notification_id, error = %e, "failed to forward notification as SMS");
        }
    });
}
