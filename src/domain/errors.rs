// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Trading error: {0}")]
    Trading(#[from] TradingError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

/// Response class an error is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Client,
    Upstream,
    Trading,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Client => "client_error",
            ErrorKind::Upstream => "upstream_error",
            ErrorKind::Trading => "trading_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Parse(_) | AppError::Validation(_) => ErrorKind::Client,
            AppError::Connection(_) => ErrorKind::Upstream,
            AppError::Trading(_) => ErrorKind::Trading,
            _ => ErrorKind::Internal,
        }
    }

    /// Message safe to hand back to a caller. Internal failures are not echoed.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the failure looks like a dropped venue connection
    pub fn is_connection_related(&self) -> bool {
        if matches!(self, AppError::Connection(_)) {
            return true;
        }

        let text = self.to_string().to_lowercase();
        text.contains("not connected") || text.contains("connection")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty message")]
    Empty,

    #[error("Unsupported action: {0}")]
    UnknownAction(String),

    #[error("Missing symbol for action {0}")]
    MissingSymbol(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: String, value: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("At least one of stop_loss or take_profit must be specified")]
    MissingProtection,

    #[error("{0} must be greater than 0")]
    NotPositive(&'static str),

    #[error("{0} must be a non-negative number or null")]
    Negative(&'static str),

    #[error("Comment must be 255 characters or less (got {0})")]
    CommentTooLong(usize),

    #[error("Invalid symbol format: {0}")]
    InvalidSymbol(String),

    #[error("Volume {volume} is below minimum {min}")]
    VolumeBelowMinimum { volume: String, min: String },

    #[error("Volume {volume} exceeds maximum {max}")]
    VolumeAboveMaximum { volume: String, max: String },

    #[error("Symbol {0} is not in allowed symbols list")]
    SymbolNotAllowed(String),

    #[error("No trading intervals configured")]
    NoIntervalsConfigured,
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Venue connection failed before {operation}")]
    Unavailable { operation: String },

    #[error("Venue reconnection failed during {operation}: {cause}")]
    ReconnectFailed {
        operation: String,
        #[source]
        cause: Box<AppError>,
    },

    #[error("Retry after reconnection failed during {operation}: {cause}")]
    RetryFailed {
        operation: String,
        #[source]
        cause: Box<AppError>,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradingError {
    #[error("Symbol {0} is not available for trading")]
    SymbolUnavailable(String),

    #[error("Failed to get symbol info for {0}")]
    SymbolInfoUnavailable(String),

    #[error("Failed to {operation} - no result, last error=({code}, {message})")]
    NoResult {
        operation: String,
        code: i32,
        message: String,
    },

    #[error("Order failed: {retcode} - {comment}")]
    Rejected { retcode: u32, comment: String },

    #[error("No open positions found for {0}")]
    NoPositions(String),

    #[error("Position with ticket {0} not found")]
    PositionNotFound(u64),

    #[error("Trading not allowed at current time due to trading hours restrictions")]
    OutsideTradingHours,
}

pub type AppResult<T> = Result<T, AppError>;
pub type ParseResult<T> = Result<T, ParseError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type TradingResult<T> = Result<T, TradingError>;
