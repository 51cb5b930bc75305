use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::{Identity, Notification};
use crate::services::identity;
use crate::services::lifecycle::BookingLifecycle;
use crate::services::messaging::MessagingProvider;
use crate::services::notifications::StoreNotificationSink;
use crate::services::store::SqliteStore;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub bookings: BookingLifecycle,
    pub notifications_tx: broadcast::Sender<Notification>,
}

impl AppState {
    /// Wires the SQLite store, the notification sink and the lifecycle
    /// manager around one shared connection.
    pub fn new(
        conn: Connection,
        config: AppConfig,
        messaging: Option<Arc<dyn MessagingProvider>>,
    ) -> Arc<Self> {
        let db = Arc::new(Mutex::new(conn));
        let (notifications_tx, _) = broadcast::channel(256);

        let store = Arc::new(SqliteStore::new(db.clone()));
        let sink = Arc::new(StoreNotificationSink::new(
            db.clone(),
            notifications_tx.clone(),
            messaging,
        ));

        Arc::new(Self {
            db,
            config,
            bookings: BookingLifecycle::new(store, sink),
            notifications_tx,
        })
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database lock poisoned")))
    }

    pub fn resolve_caller(&self, token: &str) -> Result<Identity, AppError> {
        let conn = self.conn()?;
        identity::resolve_caller(&conn, &self.config.session_secret, token)
    }
}
