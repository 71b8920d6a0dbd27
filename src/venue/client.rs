// src/venue/client.rs
use crate::domain::models::{AccountInfo, OrderRequest, OrderResult, Position, SymbolInfo};
use async_trait::async_trait;
use std::fmt;

/// Last error reported by the venue terminal
#[derive(Debug, Clone, PartialEq)]
pub struct VenueError {
    pub code: i32,
    pub message: String,
}

impl VenueError {
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn none() -> Self {
        Self::new(1, "Success")
    }
}

impl fmt::Display for VenueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, '{}')", self.code, self.message)
    }
}

/// Trading terminal primitives. Implementations own the account, position and order state.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Initialize the terminal session, true on success
    async fn connect(&self) -> bool;

    /// Cheap liveness probe
    async fn is_connected(&self) -> bool;

    async fn account_info(&self) -> Option<AccountInfo>;

    /// Fresh instrument snapshot, None if the symbol is unknown
    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo>;

    /// Open positions, optionally filtered by symbol
    async fn positions_get(&self, symbol: Option<&str>) -> Vec<Position>;

    /// Submit a request. None means the terminal produced no result; see `last_error`.
    async fn order_send(&self, request: &OrderRequest) -> Option<OrderResult>;

    async fn last_error(&self) -> VenueError;
}
