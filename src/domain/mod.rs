// src/domain/mod.rs
pub mod errors;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AppError, AppResult, ConnectionError, ErrorKind, ParseError, ParseResult, TradingError,
    TradingResult, ValidationError, ValidationResult,
};
pub use models::{
    AccountInfo, Action, FillingMode, Intent, OrderRequest, OrderResult, OrderSide, ParamValue,
    Position, RequestAction, SymbolInfo, TimeInForce, RETCODE_DONE,
};
