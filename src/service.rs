// src/service.rs
// Request flow from raw command to venue result

use crate::command::parser;
use crate::config::Config;
use crate::domain::errors::{AppError, AppResult, ErrorKind, ParseError, ValidationError};
use crate::domain::models::{AccountInfo, Action, Intent, Position};
use crate::trading::execution::{OrderDefaults, OrderExecutor};
use crate::trading::hours::{HoursStatus, TradingHoursGate};
use crate::trading::positions::PositionManager;
use crate::trading::validator::{self, ValidationLimits};
use crate::venue::client::VenueClient;
use crate::venue::connection::ConnectionManager;
use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TEST_TICKET: u64 = 999_999_999;

/// JSON body returned for every request
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl Reply {
    pub fn ok(message: &str, result: Value) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            result: Some(result),
            error: None,
            kind: None,
        }
    }

    /// Failure body; internal errors are reported without their details
    pub fn from_error(error: &AppError) -> Self {
        Self {
            success: false,
            message: None,
            result: None,
            error: Some(error.public_message()),
            kind: Some(error.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub venue_connected: bool,
    pub account_info: Option<AccountInfo>,
    pub trading_hours: HoursStatus,
    pub timestamp: DateTime<Utc>,
}

/// Open positions, optionally for one symbol
#[derive(Debug, Clone, Serialize)]
pub struct PositionsReport {
    pub positions: Vec<Position>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Time left until the next whole minute starts
pub fn delay_to_next_minute(now: DateTime<Utc>) -> Duration {
    let elapsed = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(60).saturating_sub(elapsed)
}

/// Shared context wiring the parser, validator, gate and venue-facing managers
pub struct TradeService<V: VenueClient> {
    connection: Arc<ConnectionManager<V>>,
    gate: TradingHoursGate,
    executor: OrderExecutor<V>,
    positions: PositionManager<V>,
    limits: ValidationLimits,
    align_to_minute: bool,
}

impl<V: VenueClient> TradeService<V> {
    pub fn new(venue: Arc<V>, config: &Config) -> AppResult<Self> {
        let connection = Arc::new(ConnectionManager::new(venue));

        Ok(Self {
            gate: TradingHoursGate::from_config(&config.trading_hours)?,
            executor: OrderExecutor::new(connection.clone(), OrderDefaults::from(&config.trading)),
            positions: PositionManager::new(connection.clone(), config.trading.max_slippage),
            limits: ValidationLimits::from(&config.trading),
            align_to_minute: config.trading.align_to_minute,
            connection,
        })
    }

    pub fn gate(&self) -> &TradingHoursGate {
        &self.gate
    }

    /// Open the venue session
    pub async fn connect(&self) -> bool {
        self.connection.connect().await
    }

    /// Signal source path: orders wait for the next whole minute when configured to
    pub async fn handle_webhook(&self, raw: &str) -> Reply {
        self.respond(raw, self.align_to_minute).await
    }

    /// Manual path: same flow, no minute alignment
    pub async fn handle_manual(&self, raw: &str) -> Reply {
        self.respond(raw, false).await
    }

    async fn respond(&self, raw: &str, align: bool) -> Reply {
        match self.process(raw, align).await {
            Ok(reply) => reply,
            Err(e) => {
                match e.kind() {
                    ErrorKind::Client => log::warn!("Rejected request: {}", e),
                    ErrorKind::Upstream | ErrorKind::Trading => log::error!("Trade failed: {}", e),
                    ErrorKind::Internal => log::error!("Unexpected error: {:?}", e),
                }
                Reply::from_error(&e)
            }
        }
    }

    /// Parse and run one raw command, JSON or token text
    pub async fn process(&self, raw: &str, align: bool) -> AppResult<Reply> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ParseError::Empty.into());
        }

        let intent = if trimmed.starts_with('{') {
            let payload: Value = serde_json::from_str(trimmed)
                .map_err(|e| ParseError::InvalidPayload(e.to_string()))?;

            if payload.get("test") == Some(&Value::Bool(true)) {
                log::info!("Test mode enabled, simulating request: {}", payload);
                return Ok(Self::simulate(&payload));
            }

            parser::parse_payload(&payload)?
        } else {
            parser::parse_text(trimmed)?
        };

        log::info!("Request received: {:?}", intent);
        self.execute(&intent, align).await
    }

    fn simulate(payload: &Value) -> Reply {
        let result = json!({
            "action": payload.get("action").cloned().unwrap_or_else(|| json!("unknown")),
            "symbol": payload.get("symbol").cloned().unwrap_or_else(|| json!("TEST")),
            "volume": payload.get("volume").cloned().unwrap_or_else(|| json!(0.01)),
            "price": 1.0,
            "ticket": TEST_TICKET,
            "timestamp": Utc::now(),
            "test_mode": true,
        });

        Reply::ok("Test mode - operation simulated successfully", result)
    }

    /// Validate, gate and route an already parsed intent
    pub async fn execute(&self, intent: &Intent, align: bool) -> AppResult<Reply> {
        validator::validate(intent, &self.limits)?;

        match intent.action {
            Action::EnableTradingHours => {
                self.gate.enable()?;
                let status = serde_json::to_value(self.gate.status())?;
                return Ok(Reply::ok("Trading hours enabled", status));
            }
            Action::DisableTradingHours => {
                self.gate.disable();
                let status = serde_json::to_value(self.gate.status())?;
                return Ok(Reply::ok("Trading hours disabled", status));
            }
            _ => {}
        }

        self.gate.check(intent.enable_time_check)?;

        if align {
            let now = Utc::now();
            let delay = delay_to_next_minute(now);
            log::info!(
                "Current time: {}, waiting {:.1} seconds",
                now.format("%H:%M:%S"),
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }

        let symbol = intent
            .symbol
            .as_deref()
            .ok_or(ValidationError::MissingField("symbol"))?;

        let result = match intent.action {
            Action::Buy | Action::Sell => {
                serde_json::to_value(self.executor.submit(intent).await?)?
            }
            Action::Close => serde_json::to_value(
                self.positions
                    .close(symbol, intent.ticket, intent.volume, intent.close_side)
                    .await?,
            )?,
            Action::CloseAll => {
                serde_json::to_value(self.positions.close_all(Some(symbol)).await?)?
            }
            Action::Modify => serde_json::to_value(
                self.positions
                    .modify(symbol, intent.ticket, intent.stop_loss, intent.take_profit)
                    .await?,
            )?,
            Action::EnableTradingHours | Action::DisableTradingHours => Value::Null,
        };

        Ok(Reply::ok("Trade executed successfully", result))
    }

    /// List open positions through the reconnect policy
    pub async fn positions(&self, symbol: Option<&str>) -> AppResult<PositionsReport> {
        let venue = self.connection.venue();
        let positions = self
            .connection
            .with_retry("positions_get", || async move {
                Ok::<_, AppError>(venue.positions_get(symbol).await)
            })
            .await?;

        log::info!("Listed {} open positions", positions.len());
        Ok(PositionsReport {
            count: positions.len(),
            positions,
            timestamp: Utc::now(),
        })
    }

    /// Venue liveness, account snapshot and gate state
    pub async fn health(&self) -> HealthReport {
        let venue = self.connection.venue();
        let connected = venue.is_connected().await;
        let account_info = if connected {
            venue.account_info().await
        } else {
            None
        };

        HealthReport {
            status: if connected { "healthy" } else { "unhealthy" },
            venue_connected: connected,
            account_info,
            trading_hours: self.gate.status(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntervalConfig;
    use crate::venue::paper::PaperVenue;
    use chrono::TimeZone;

    fn config_with_closed_window() -> Config {
        let mut config = Config::default();
        config.trading.align_to_minute = false;
        // A zero-length window is closed for all but one instant a day
        config.trading_hours.intervals.insert(
            "closed".to_string(),
            IntervalConfig {
                name: "Closed".to_string(),
                start_time: "00:00".to_string(),
                end_time: "00:00".to_string(),
                timezone: None,
                description: String::new(),
            },
        );
        config
    }

    async fn service(config: &Config) -> (Arc<PaperVenue>, TradeService<PaperVenue>) {
        let venue = Arc::new(PaperVenue::with_default_book());
        let service = TradeService::new(venue.clone(), config).unwrap();
        assert!(service.connect().await);
        venue.reset_counters();
        (venue, service)
    }

    #[test]
    fn minute_alignment_delay() {
        let at = |s: u32| Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, s).unwrap();
        assert_eq!(delay_to_next_minute(at(15)), Duration::from_secs(45));
        assert_eq!(delay_to_next_minute(at(0)), Duration::from_secs(60));
        assert_eq!(delay_to_next_minute(at(59)), Duration::from_secs(1));
    }

    #[test]
    fn internal_errors_are_not_echoed() {
        let reply = Reply::from_error(&AppError::Unknown("db password".to_string()));
        assert_eq!(reply.error.as_deref(), Some("Internal server error"));
        assert_eq!(reply.kind, Some("internal_error"));
    }

    #[tokio::test]
    async fn text_buy_opens_a_position() {
        let (venue, service) = service(&config_with_closed_window()).await;

        let reply = service.handle_webhook("开多 EURUSD 仓位=0.2 止损=1.07").await;
        assert!(reply.success, "{:?}", reply);

        let result = reply.result.unwrap();
        assert_eq!(result["symbol"], "EURUSD");
        assert_eq!(result["action"], "BUY");
        assert_eq!(result["volume"], 0.2);

        let positions = venue.positions_get(None).await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].ticket, result["ticket"].as_u64().unwrap());
    }

    #[tokio::test]
    async fn test_mode_never_touches_the_venue() {
        let (venue, service) = service(&config_with_closed_window()).await;

        let reply = service
            .handle_webhook(r#"{"action": "buy", "symbol": "EURUSD", "test": true}"#)
            .await;
        assert!(reply.success);
        let result = reply.result.unwrap();
        assert_eq!(result["ticket"], TEST_TICKET);
        assert_eq!(result["test_mode"], true);
        assert_eq!(venue.send_calls(), 0);
    }

    #[tokio::test]
    async fn failures_carry_their_class() {
        let (_, service) = service(&config_with_closed_window()).await;

        let reply = service.handle_manual("跳舞 EURUSD").await;
        assert!(!reply.success);
        assert_eq!(reply.kind, Some("client_error"));
        assert!(reply.error.unwrap().contains("跳舞"));

        let reply = service.handle_manual("平仓 EURUSD").await;
        assert_eq!(reply.kind, Some("trading_error"));
    }

    #[tokio::test]
    async fn gate_toggles_through_commands() {
        let (venue, service) = service(&config_with_closed_window()).await;

        let reply = service.handle_webhook("开启时间区间").await;
        assert!(reply.success);
        assert_eq!(reply.result.unwrap()["enabled"], true);

        let reply = service.handle_webhook("buy EURUSD").await;
        assert_eq!(reply.kind, Some("trading_error"));
        assert_eq!(venue.send_calls(), 0);

        assert!(service.handle_webhook("关闭时间区间").await.success);
        assert!(service.handle_webhook("buy EURUSD").await.success);
    }

    #[tokio::test]
    async fn per_request_time_check_applies_while_disabled() {
        let (venue, service) = service(&config_with_closed_window()).await;
        assert!(!service.gate().is_enabled());

        let reply = service.handle_webhook("sell EURUSD 开启时间区间").await;
        assert_eq!(reply.kind, Some("trading_error"));
        assert_eq!(venue.send_calls(), 0);
    }

    #[tokio::test]
    async fn enabling_without_intervals_is_a_client_error() {
        let mut config = Config::default();
        config.trading.align_to_minute = false;
        let (_, service) = service(&config).await;

        let reply = service.handle_manual("enable trading hours").await;
        assert_eq!(reply.kind, Some("client_error"));
    }

    #[tokio::test]
    async fn modify_and_close_by_ticket() {
        let (venue, service) = service(&config_with_closed_window()).await;
        let opened = service.handle_manual("buy EURUSD").await.result.unwrap();
        let ticket = opened["ticket"].as_u64().unwrap();

        let reply = service
            .handle_manual(&format!("修改 EURUSD 订单号={} 止盈=1.1", ticket))
            .await;
        assert!(reply.success, "{:?}", reply);
        assert_eq!(venue.positions_get(None).await[0].take_profit, rust_decimal_macros::dec!(1.1));

        let payload = json!({"action": "close", "symbol": "EURUSD", "ticket": ticket});
        let reply = service.handle_manual(&payload.to_string()).await;
        assert!(reply.success);
        assert_eq!(reply.result.unwrap()["closed_positions"][0]["original_ticket"], ticket);
        assert!(venue.positions_get(None).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn webhook_orders_wait_for_the_next_minute_independently() {
        let mut config = config_with_closed_window();
        config.trading.align_to_minute = true;
        let (venue, service) = service(&config).await;
        let start = tokio::time::Instant::now();

        let first = async {
            let reply = service.handle_webhook("buy EURUSD").await;
            (reply, start.elapsed())
        };
        let second = async {
            let reply = service.handle_webhook("sell GBPUSD").await;
            (reply, start.elapsed())
        };
        let manual = async {
            let reply = service.handle_manual("buy XAUUSD").await;
            (reply, start.elapsed())
        };
        let ((first, first_waited), (second, second_waited), (manual, manual_waited)) =
            tokio::join!(first, second, manual);

        assert!(first.success, "{:?}", first);
        assert!(second.success, "{:?}", second);
        assert!(manual.success, "{:?}", manual);

        assert_eq!(manual_waited, Duration::ZERO);
        for waited in [first_waited, second_waited] {
            assert!(waited > Duration::ZERO && waited <= Duration::from_secs(60), "{:?}", waited);
        }
        assert_eq!(venue.send_calls(), 3);
        assert_eq!(venue.positions_get(None).await.len(), 3);
    }

    #[tokio::test]
    async fn positions_are_listed_and_filtered() {
        let (venue, service) = service(&config_with_closed_window()).await;
        assert!(service.handle_manual("buy EURUSD").await.success);
        assert!(service.handle_manual("sell GBPUSD").await.success);

        let report = service.positions(None).await.unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.positions.len(), 2);

        venue.drop_connection();
        let report = service.positions(Some("GBPUSD")).await.unwrap();
        assert_eq!(report.count, 1);
        assert_eq!(report.positions[0].symbol, "GBPUSD");
        assert_eq!(venue.connect_calls(), 1);

        let body = serde_json::to_value(&report).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["positions"][0]["symbol"], "GBPUSD");
    }

    #[tokio::test]
    async fn positions_fail_upstream_when_the_venue_is_unreachable() {
        let (venue, service) = service(&config_with_closed_window()).await;
        venue.drop_connection();
        venue.fail_next_connects(1);

        let error = service.positions(None).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn health_reports_account() {
        let (venue, service) = service(&config_with_closed_window()).await;

        let report = service.health().await;
        assert_eq!(report.status, "healthy");
        assert!(report.account_info.is_some());

        venue.drop_connection();
        let report = service.health().await;
        assert!(!report.venue_connected);
        assert!(report.account_info.is_none());
    }
}
