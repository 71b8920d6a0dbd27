// src/trading/positions.rs
use crate::domain::errors::{AppError, AppResult, TradingError, ValidationError};
use crate::domain::models::{
    FillingMode, OrderRequest, OrderResult, OrderSide, Position, RequestAction, TimeInForce,
};
use crate::trading::execution::send_checked;
use crate::venue::client::VenueClient;
use crate::venue::connection::ConnectionManager;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Result of closing one position. Failures carry `error` instead of fill fields.
#[derive(Debug, Clone, Serialize)]
pub struct CloseOutcome {
    pub original_ticket: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_ticket: Option<u64>,
    pub symbol: String,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub volume: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retcode: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CloseOutcome {
    fn closed(position: &Position, result: &OrderResult) -> Self {
        Self {
            original_ticket: position.ticket,
            close_ticket: Some(result.ticket),
            symbol: position.symbol.clone(),
            volume: Some(result.volume),
            price: Some(result.price),
            profit: Some(position.profit),
            retcode: Some(result.retcode),
            error: None,
            timestamp: result.timestamp,
        }
    }

    fn failed(ticket: u64, symbol: &str, error: &AppError) -> Self {
        Self {
            original_ticket: ticket,
            close_ticket: None,
            symbol: symbol.to_string(),
            volume: None,
            price: None,
            profit: None,
            retcode: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One entry per position attempted
#[derive(Debug, Clone, Serialize)]
pub struct CloseReport {
    pub closed_positions: Vec<CloseOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CloseReport {
    pub fn succeeded(&self) -> usize {
        self.closed_positions.iter().filter(|o| o.is_success()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModifyReport {
    pub ticket: u64,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sl: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tp: Decimal,
    pub retcode: u32,
    pub timestamp: DateTime<Utc>,
}

/// Close and modify operations on open positions
pub struct PositionManager<V: VenueClient> {
    connection: Arc<ConnectionManager<V>>,
    deviation: Option<u32>,
}

impl<V: VenueClient> PositionManager<V> {
    /// `max_slippage` of 0 sends closes without a deviation bound
    pub fn new(connection: Arc<ConnectionManager<V>>, max_slippage: u32) -> Self {
        Self {
            connection,
            deviation: (max_slippage > 0).then_some(max_slippage),
        }
    }

    /// Close the positions on `symbol`, narrowed by ticket and side.
    /// `volume` caps each close; a volume above the position's closes it fully.
    pub async fn close(
        &self,
        symbol: &str,
        ticket: Option<u64>,
        volume: Option<Decimal>,
        side: Option<OrderSide>,
    ) -> AppResult<CloseReport> {
        self.connection
            .with_retry("close_position", || {
                self.close_matching(symbol, ticket, volume, side)
            })
            .await
    }

    /// Close every open position, optionally only those on `symbol`.
    /// Each position is closed on its own; failures are listed, not raised.
    pub async fn close_all(&self, symbol: Option<&str>) -> AppResult<CloseReport> {
        self.connection
            .with_retry("close_all_positions", || self.close_each(symbol))
            .await
    }

    /// Change SL/TP on a position, keeping the current value of whichever is not given
    pub async fn modify(
        &self,
        symbol: &str,
        ticket: Option<u64>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> AppResult<ModifyReport> {
        let ticket = ticket.ok_or(ValidationError::MissingField("ticket"))?;
        if stop_loss.is_none() && take_profit.is_none() {
            return Err(ValidationError::MissingProtection.into());
        }

        self.connection
            .with_retry("modify_position", || {
                self.apply_protection(symbol, ticket, stop_loss, take_profit)
            })
            .await
    }

    async fn close_matching(
        &self,
        symbol: &str,
        ticket: Option<u64>,
        volume: Option<Decimal>,
        side: Option<OrderSide>,
    ) -> AppResult<CloseReport> {
        let mut positions = self.connection.venue().positions_get(Some(symbol)).await;
        if positions.is_empty() {
            return Err(TradingError::NoPositions(symbol.to_string()).into());
        }

        if let Some(ticket) = ticket {
            positions.retain(|p| p.ticket == ticket);
            if positions.is_empty() {
                return Err(TradingError::PositionNotFound(ticket).into());
            }
        }

        if let Some(side) = side {
            positions.retain(|p| p.side == side);
            if positions.is_empty() {
                return Err(TradingError::NoPositions(format!("{} {}", symbol, side)).into());
            }
        }

        let mut outcomes = Vec::with_capacity(positions.len());
        for position in &positions {
            let outcome = match self.close_position(position, volume).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Failed to close position {}: {}", position.ticket, e);
                    CloseOutcome::failed(position.ticket, &position.symbol, &e)
                }
            };
            outcomes.push(outcome);
        }

        Ok(CloseReport {
            closed_positions: outcomes,
            message: None,
        })
    }

    async fn close_each(&self, symbol: Option<&str>) -> AppResult<CloseReport> {
        let positions = self.connection.venue().positions_get(symbol).await;
        if positions.is_empty() {
            return Ok(CloseReport {
                closed_positions: Vec::new(),
                message: Some("No positions to close".to_string()),
            });
        }

        log::info!("Closing {} open positions", positions.len());

        let mut outcomes = Vec::with_capacity(positions.len());
        for position in &positions {
            match self
                .close_matching(&position.symbol, Some(position.ticket), None, None)
                .await
            {
                Ok(report) => outcomes.extend(report.closed_positions),
                Err(e) => {
                    log::error!("Failed to close position {}: {}", position.ticket, e);
                    outcomes.push(CloseOutcome::failed(position.ticket, &position.symbol, &e));
                }
            }
        }

        Ok(CloseReport {
            closed_positions: outcomes,
            message: None,
        })
    }

    async fn close_position(
        &self,
        position: &Position,
        requested: Option<Decimal>,
    ) -> AppResult<CloseOutcome> {
        let venue = self.connection.venue();
        let volume = requested.map_or(position.volume, |v| v.min(position.volume));

        let info = venue
            .symbol_info(&position.symbol)
            .await
            .ok_or_else(|| TradingError::SymbolInfoUnavailable(position.symbol.clone()))?;

        let price = match position.side {
            OrderSide::Buy => info.bid,
            OrderSide::Sell => info.ask,
        };

        let request = OrderRequest {
            action: RequestAction::Deal,
            symbol: position.symbol.clone(),
            volume,
            side: Some(position.side.opposite()),
            price,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            deviation: self.deviation,
            magic: position.magic,
            comment: format!("Close {}", position.ticket),
            position: Some(position.ticket),
            time_in_force: TimeInForce::GoodTillCancel,
            filling: Some(FillingMode::negotiate(&info.name, info.filling_mode_flags)),
        };

        let operation = format!("close position {}", position.ticket);
        let result = send_checked(venue.as_ref(), &request, &operation).await?;

        log::info!(
            "Position closed - {} {} {} @ {} - ticket {}",
            position.side,
            position.symbol,
            volume,
            result.price,
            position.ticket
        );

        Ok(CloseOutcome::closed(position, &result))
    }

    async fn apply_protection(
        &self,
        symbol: &str,
        ticket: u64,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> AppResult<ModifyReport> {
        let venue = self.connection.venue();

        let position = venue
            .positions_get(Some(symbol))
            .await
            .into_iter()
            .find(|p| p.ticket == ticket)
            .ok_or(TradingError::PositionNotFound(ticket))?;

        let request = OrderRequest::modify(
            symbol,
            ticket,
            stop_loss.unwrap_or(position.stop_loss),
            take_profit.unwrap_or(position.take_profit),
        );

        let operation = format!("modify position {}", ticket);
        let result = send_checked(venue.as_ref(), &request, &operation).await?;

        log::info!(
            "Position {} modified - SL: {}, TP: {}",
            ticket,
            request.stop_loss,
            request.take_profit
        );

        Ok(ModifyReport {
            ticket,
            symbol: symbol.to_string(),
            sl: request.stop_loss,
            tp: request.take_profit,
            retcode: result.retcode,
            timestamp: result.timestamp,
        })
    }
}
