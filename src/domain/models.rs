// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Venue return code for a completed request
pub const RETCODE_DONE: u32 = 10009;

/// Canonical trade instruction action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Close,
    CloseAll,
    Modify,
    EnableTradingHours,
    DisableTradingHours,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Buy,
        Action::Sell,
        Action::Close,
        Action::CloseAll,
        Action::Modify,
        Action::EnableTradingHours,
        Action::DisableTradingHours,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Close => "close",
            Action::CloseAll => "close_all",
            Action::Modify => "modify",
            Action::EnableTradingHours => "enable_trading_hours",
            Action::DisableTradingHours => "disable_trading_hours",
        }
    }

    /// Administrative actions take no symbol and never hit the venue
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            Action::EnableTradingHours | Action::DisableTradingHours
        )
    }

    pub fn is_trading(&self) -> bool {
        !self.is_administrative()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A keyed parameter value after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(Decimal),
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            ParamValue::Float(value) => Some(*value),
            ParamValue::Int(value) => Some(Decimal::from(*value)),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Int(value) => Some(*value),
            ParamValue::Float(value) if value.fract().is_zero() => value.to_i64(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Float(value) => serde_json::Value::String(value.to_string()),
            ParamValue::Int(value) => serde_json::Value::from(*value),
            ParamValue::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Float(value) => write!(f, "{}", value),
            ParamValue::Int(value) => write!(f, "{}", value),
            ParamValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Normalized trade instruction, independent of the wire format it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: Action,
    pub symbol: Option<String>,
    pub volume: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub price: Option<Decimal>,
    pub comment: Option<String>,
    pub magic: Option<i64>,
    pub ticket: Option<u64>,
    pub enable_time_check: bool,
    /// Restricts a close to positions of this side
    pub close_side: Option<OrderSide>,
    pub deviation: Option<u32>,
    pub switches: BTreeSet<String>,
    pub extras: BTreeMap<String, ParamValue>,
}

impl Intent {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            symbol: None,
            volume: None,
            stop_loss: None,
            take_profit: None,
            price: None,
            comment: None,
            magic: None,
            ticket: None,
            enable_time_check: false,
            close_side: None,
            deviation: None,
            switches: BTreeSet::new(),
            extras: BTreeMap::new(),
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn side(&self) -> Option<OrderSide> {
        match self.action {
            Action::Buy => Some(OrderSide::Buy),
            Action::Sell => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

/// Order filling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillingMode {
    FillOrKill,
    ImmediateOrCancel,
    Return,
}

impl FillingMode {
    pub const FLAG_FOK: u32 = 1;
    pub const FLAG_IOC: u32 = 2;
    pub const FLAG_RETURN: u32 = 4;

    /// Highest priority mode advertised in the instrument flags
    pub fn select(flags: u32) -> Option<FillingMode> {
        if flags & Self::FLAG_FOK != 0 {
            Some(FillingMode::FillOrKill)
        } else if flags & Self::FLAG_IOC != 0 {
            Some(FillingMode::ImmediateOrCancel)
        } else if flags & Self::FLAG_RETURN != 0 {
            Some(FillingMode::Return)
        } else {
            None
        }
    }

    /// Like `select`, falling back to fill-or-kill when nothing is advertised
    pub fn negotiate(symbol: &str, flags: u32) -> FillingMode {
        match Self::select(flags) {
            Some(mode) => mode,
            None => {
                log::warn!(
                    "Symbol {} advertises no filling mode (flags={}), defaulting to FOK",
                    symbol,
                    flags
                );
                FillingMode::FillOrKill
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillingMode::FillOrKill => "FOK",
            FillingMode::ImmediateOrCancel => "IOC",
            FillingMode::Return => "RETURN",
        }
    }
}

/// Per-instrument snapshot as reported by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub name: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume_min: Decimal,
    pub volume_max: Decimal,
    pub volume_step: Decimal,
    pub filling_mode_flags: u32,
    pub tradeable: bool,
}

/// Open position as reported by the venue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_open: Decimal,
    /// Zero means no stop loss
    #[serde(with = "rust_decimal::serde::float")]
    pub stop_loss: Decimal,
    /// Zero means no take profit
    #[serde(with = "rust_decimal::serde::float")]
    pub take_profit: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    pub magic: i64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub login: u64,
    pub name: String,
    pub server: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub equity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub free_margin: Decimal,
    pub leverage: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestAction {
    /// Market deal, opening or closing
    Deal,
    /// Stop loss / take profit change on an open position
    Sltp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeInForce {
    GoodTillCancel,
}

/// Request handed to the venue's order_send
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub action: RequestAction,
    pub symbol: String,
    pub volume: Decimal,
    pub side: Option<OrderSide>,
    pub price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub deviation: Option<u32>,
    pub magic: i64,
    pub comment: String,
    /// Position the request acts on, for closes and modifications
    pub position: Option<u64>,
    pub time_in_force: TimeInForce,
    pub filling: Option<FillingMode>,
}

impl OrderRequest {
    pub fn modify(symbol: &str, position: u64, stop_loss: Decimal, take_profit: Decimal) -> Self {
        Self {
            action: RequestAction::Sltp,
            symbol: symbol.to_string(),
            volume: Decimal::ZERO,
            side: None,
            price: Decimal::ZERO,
            stop_loss,
            take_profit,
            deviation: None,
            magic: 0,
            comment: String::new(),
            position: Some(position),
            time_in_force: TimeInForce::GoodTillCancel,
            filling: None,
        }
    }
}

/// Outcome of an order_send call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResult {
    pub ticket: u64,
    pub retcode: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

impl OrderResult {
    pub fn is_success(&self) -> bool {
        self.retcode == RETCODE_DONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn filling_mode_priority() {
        assert_eq!(FillingMode::select(0b011), Some(FillingMode::FillOrKill));
        assert_eq!(FillingMode::select(0b010), Some(FillingMode::ImmediateOrCancel));
        assert_eq!(FillingMode::select(0b110), Some(FillingMode::ImmediateOrCancel));
        assert_eq!(FillingMode::select(0b100), Some(FillingMode::Return));
        assert_eq!(FillingMode::select(0), None);
        assert_eq!(FillingMode::negotiate("EURUSD", 0), FillingMode::FillOrKill);
    }

    #[test]
    fn administrative_actions() {
        let admin: Vec<Action> = Action::ALL
            .iter()
            .copied()
            .filter(Action::is_administrative)
            .collect();
        assert_eq!(
            admin,
            vec![Action::EnableTradingHours, Action::DisableTradingHours]
        );
    }

    #[test]
    fn param_value_integers() {
        assert_eq!(ParamValue::Int(7).as_integer(), Some(7));
        assert_eq!(ParamValue::Float(dec!(12.0)).as_integer(), Some(12));
        assert_eq!(ParamValue::Float(dec!(12.5)).as_integer(), None);
        assert_eq!(ParamValue::Text("x".into()).as_decimal(), None);
    }
}
