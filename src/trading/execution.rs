// src/trading/execution.rs
use crate::config::TradingConfig;
use crate::domain::errors::{AppError, AppResult, TradingError, ValidationError};
use crate::domain::models::{
    FillingMode, Intent, OrderRequest, OrderResult, OrderSide, RequestAction, SymbolInfo,
    TimeInForce,
};
use crate::trading::validator::MAX_COMMENT_CHARS;
use crate::venue::client::VenueClient;
use crate::venue::connection::ConnectionManager;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::sync::Arc;

/// Comment stamped on orders that carry none
pub const DEFAULT_COMMENT: &str = "Webhook Trade";

/// Order values used when an intent leaves them out
#[derive(Debug, Clone)]
pub struct OrderDefaults {
    pub volume: Decimal,
    pub magic: i64,
    /// Max deviation in points, 0 sends none
    pub max_slippage: u32,
}

impl From<&TradingConfig> for OrderDefaults {
    fn from(config: &TradingConfig) -> Self {
        Self {
            volume: config.default_volume,
            magic: config.magic_number,
            max_slippage: config.max_slippage,
        }
    }
}

/// Filled market order, as reported back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct TradeReport {
    pub ticket: u64,
    pub symbol: String,
    pub action: OrderSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub sl: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub tp: Option<Decimal>,
    pub comment: String,
    pub magic: i64,
    pub filling: FillingMode,
    pub retcode: u32,
    pub timestamp: DateTime<Utc>,
}

impl TradeReport {
    fn new(intent: &Intent, request: &OrderRequest, side: OrderSide, result: &OrderResult) -> Self {
        Self {
            ticket: result.ticket,
            symbol: request.symbol.clone(),
            action: side,
            volume: request.volume,
            price: result.price,
            sl: intent.stop_loss,
            tp: intent.take_profit,
            comment: request.comment.clone(),
            magic: request.magic,
            filling: request.filling.unwrap_or(FillingMode::FillOrKill),
            retcode: result.retcode,
            timestamp: result.timestamp,
        }
    }
}

/// Clamp to the instrument's volume range, round to the nearest step, then move
/// whole steps back inside the range when the limits are not step-aligned
pub fn adjust_volume(requested: Decimal, info: &SymbolInfo) -> Decimal {
    let clamped = requested.max(info.volume_min).min(info.volume_max);
    let step = info.volume_step;

    if step <= Decimal::ZERO {
        return clamped.normalize();
    }

    let steps = (clamped / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let mut adjusted = steps * step;

    if adjusted < info.volume_min {
        adjusted += ((info.volume_min - adjusted) / step).ceil() * step;
    }
    if adjusted > info.volume_max {
        adjusted -= ((adjusted - info.volume_max) / step).ceil() * step;
    }

    adjusted.normalize()
}

/// Keep word characters, whitespace and `-_.,()[]{}`, capped at 255 characters
pub fn sanitize_comment(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || "-_.,()[]{}".contains(*c))
        .take(MAX_COMMENT_CHARS)
        .collect()
}

/// Submit a request and insist on a done return code
pub(crate) async fn send_checked<V: VenueClient>(
    venue: &V,
    request: &OrderRequest,
    operation: &str,
) -> AppResult<OrderResult> {
    let result = match venue.order_send(request).await {
        Some(result) => result,
        None => {
            let error = venue.last_error().await;
            log::error!("Failed to {} - no result returned. Last error: {}", operation, error);
            return Err(TradingError::NoResult {
                operation: operation.to_string(),
                code: error.code,
                message: error.message,
            }
            .into());
        }
    };

    if !result.is_success() {
        log::warn!(
            "Venue rejected {}: {} - {}",
            operation,
            result.retcode,
            result.comment
        );
        return Err(TradingError::Rejected {
            retcode: result.retcode,
            comment: result.comment,
        }
        .into());
    }

    Ok(result)
}

/// Builds and submits market orders
pub struct OrderExecutor<V: VenueClient> {
    connection: Arc<ConnectionManager<V>>,
    defaults: OrderDefaults,
}

impl<V: VenueClient> OrderExecutor<V> {
    pub fn new(connection: Arc<ConnectionManager<V>>, defaults: OrderDefaults) -> Self {
        Self {
            connection,
            defaults,
        }
    }

    /// Open a market position for a buy or sell intent
    pub async fn submit(&self, intent: &Intent) -> AppResult<TradeReport> {
        let side = intent.side().ok_or_else(|| {
            AppError::Unknown(format!("{} is not a market order action", intent.action))
        })?;
        let symbol = intent
            .symbol
            .as_deref()
            .ok_or(ValidationError::MissingField("symbol"))?;

        self.connection
            .with_retry("market_order", || self.place(intent, symbol, side))
            .await
    }

    async fn place(&self, intent: &Intent, symbol: &str, side: OrderSide) -> AppResult<TradeReport> {
        let venue = self.connection.venue();

        let info = venue
            .symbol_info(symbol)
            .await
            .ok_or_else(|| TradingError::SymbolInfoUnavailable(symbol.to_string()))?;

        if !info.tradeable {
            return Err(TradingError::SymbolUnavailable(symbol.to_string()).into());
        }

        let request = self.build_request(intent, &info, side);
        log::info!(
            "Sending {} order: {} {} @ {} ({}, magic {})",
            side,
            request.volume,
            request.symbol,
            request.price,
            info.name,
            request.magic
        );

        let result = send_checked(venue.as_ref(), &request, "send order").await?;

        log::info!(
            "Trade executed - {} {} {} @ {} - ticket {}",
            side,
            request.symbol,
            request.volume,
            result.price,
            result.ticket
        );

        Ok(TradeReport::new(intent, &request, side, &result))
    }

    fn build_request(&self, intent: &Intent, info: &SymbolInfo, side: OrderSide) -> OrderRequest {
        let volume = adjust_volume(intent.volume.unwrap_or(self.defaults.volume), info);
        let price = match side {
            OrderSide::Buy => info.ask,
            OrderSide::Sell => info.bid,
        };

        let deviation = intent
            .deviation
            .filter(|points| *points > 0)
            .or_else(|| (self.defaults.max_slippage > 0).then_some(self.defaults.max_slippage));

        OrderRequest {
            action: RequestAction::Deal,
            symbol: info.name.clone(),
            volume,
            side: Some(side),
            price,
            stop_loss: intent.stop_loss.unwrap_or(Decimal::ZERO),
            take_profit: intent.take_profit.unwrap_or(Decimal::ZERO),
            deviation,
            magic: intent.magic.unwrap_or(self.defaults.magic),
            comment: sanitize_comment(intent.comment.as_deref().unwrap_or(DEFAULT_COMMENT)),
            position: None,
            time_in_force: TimeInForce::GoodTillCancel,
            filling: Some(FillingMode::negotiate(&info.name, info.filling_mode_flags)),
        }
    }
}
