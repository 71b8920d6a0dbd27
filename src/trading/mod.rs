// src/trading/mod.rs
pub mod execution;
pub mod hours;
pub mod positions;
pub mod validator;

pub use execution::{OrderDefaults, OrderExecutor, TradeReport};
pub use hours::TradingHoursGate;
pub use positions::{CloseReport, ModifyReport, PositionManager};
pub use validator::{validate, ValidationLimits};
