// src/venue/connection.rs
use crate::domain::errors::{AppResult, ConnectionError};
use crate::venue::client::VenueClient;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Liveness probing and a single reconnect-retry around venue operations
pub struct ConnectionManager<V: VenueClient> {
    venue: Arc<V>,
    live: AtomicBool,
    // Serializes connect/reconnect across concurrent requests
    reconnect_lock: Mutex<()>,
}

impl<V: VenueClient> ConnectionManager<V> {
    pub fn new(venue: Arc<V>) -> Self {
        Self {
            venue,
            live: AtomicBool::new(false),
            reconnect_lock: Mutex::new(()),
        }
    }

    pub fn venue(&self) -> &Arc<V> {
        &self.venue
    }

    /// Last liveness observed by this manager
    pub fn last_known_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Establish the session at startup
    pub async fn connect(&self) -> bool {
        let _guard = self.reconnect_lock.lock().await;

        let connected = self.venue.connect().await;
        self.live.store(connected, Ordering::SeqCst);

        if connected {
            log::info!("Venue connected");
        } else {
            log::error!(
                "Venue connection failed: {}",
                self.venue.last_error().await
            );
        }

        connected
    }

    async fn probe(&self) -> bool {
        let live = self.venue.is_connected().await;
        self.live.store(live, Ordering::SeqCst);
        live
    }

    async fn reconnect(&self, operation: &str) -> bool {
        let _guard = self.reconnect_lock.lock().await;

        log::warn!("Reconnecting to venue for {}", operation);
        let connected = self.venue.connect().await;
        self.live.store(connected, Ordering::SeqCst);
        connected
    }

    /// Run `op`, reconnecting at most once.
    ///
    /// The venue is probed first and reconnected if down. A failure that looks like a
    /// lost connection (probe now false, or the error mentions the connection) gets one
    /// reconnect and one more attempt; anything else is returned unchanged.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if !self.probe().await {
            log::warn!(
                "Venue not connected before {}, attempting to reconnect...",
                operation
            );
            if !self.reconnect(operation).await {
                return Err(ConnectionError::Unavailable {
                    operation: operation.to_string(),
                }
                .into());
            }
        }

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let live = self.probe().await;
        if live && !error.is_connection_related() {
            return Err(error);
        }

        log::warn!(
            "Venue connection lost during {}, attempting to reconnect: {}",
            operation,
            error
        );

        if !self.reconnect(operation).await {
            log::error!("Venue reconnection failed for {}", operation);
            return Err(ConnectionError::ReconnectFailed {
                operation: operation.to_string(),
                cause: Box::new(error),
            }
            .into());
        }

        log::info!("Venue reconnection successful, retrying {}", operation);
        match op().await {
            Ok(value) => Ok(value),
            Err(retry_error) => {
                log::error!("Retry of {} failed: {}", operation, retry_error);
                Err(ConnectionError::RetryFailed {
                    operation: operation.to_string(),
                    cause: Box::new(error),
                }
                .into())
            }
        }
    }
}
