// src/trading/validator.rs
// Structural and business-rule checks on parsed intents

use crate::command::vocabulary::is_valid_symbol;
use crate::config::TradingConfig;
use crate::domain::errors::{ValidationError, ValidationResult};
use crate::domain::models::{Action, Intent};
use rust_decimal::Decimal;

pub const MAX_COMMENT_CHARS: usize = 255;

/// Configured limits an intent is checked against
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    pub min_volume: Decimal,
    pub max_volume: Decimal,
    /// Empty means every symbol is allowed
    pub allowed_symbols: Vec<String>,
}

impl From<&TradingConfig> for ValidationLimits {
    fn from(config: &TradingConfig) -> Self {
        Self {
            min_volume: config.min_volume,
            max_volume: config.max_volume,
            allowed_symbols: config
                .allowed_symbols
                .iter()
                .map(|symbol| symbol.to_uppercase())
                .collect(),
        }
    }
}

/// Run every check in order: required fields, then types and ranges, then configured limits
pub fn validate(intent: &Intent, limits: &ValidationLimits) -> ValidationResult<()> {
    let result = check_required(intent)
        .and_then(|_| check_ranges(intent))
        .and_then(|_| check_limits(intent, limits));

    if let Err(e) = &result {
        log::warn!("Validation failed for {} request: {}", intent.action, e);
    }

    result
}

fn check_required(intent: &Intent) -> ValidationResult<()> {
    if intent.action.is_administrative() {
        return Ok(());
    }

    if intent.symbol.as_deref().map_or(true, str::is_empty) {
        return Err(ValidationError::MissingField("symbol"));
    }

    if intent.action == Action::Modify {
        if intent.ticket.is_none() {
            return Err(ValidationError::MissingField("ticket"));
        }
        if intent.stop_loss.is_none() && intent.take_profit.is_none() {
            return Err(ValidationError::MissingProtection);
        }
    }

    Ok(())
}

fn check_ranges(intent: &Intent) -> ValidationResult<()> {
    if let Some(volume) = intent.volume {
        if volume <= Decimal::ZERO {
            return Err(ValidationError::NotPositive("volume"));
        }
    }

    for (field, value) in [
        ("price", intent.price),
        ("stop_loss", intent.stop_loss),
        ("take_profit", intent.take_profit),
    ] {
        if value.map_or(false, |v| v < Decimal::ZERO) {
            return Err(ValidationError::Negative(field));
        }
    }

    if intent.magic.map_or(false, |magic| magic < 0) {
        return Err(ValidationError::Negative("magic"));
    }

    if let Some(comment) = &intent.comment {
        let length = comment.chars().count();
        if length > MAX_COMMENT_CHARS {
            return Err(ValidationError::CommentTooLong(length));
        }
    }

    if let Some(symbol) = &intent.symbol {
        if !is_valid_symbol(symbol) {
            return Err(ValidationError::InvalidSymbol(symbol.clone()));
        }
    }

    Ok(())
}

fn check_limits(intent: &Intent, limits: &ValidationLimits) -> ValidationResult<()> {
    if intent.side().is_some() {
        if let Some(volume) = intent.volume {
            if volume < limits.min_volume {
                return Err(ValidationError::VolumeBelowMinimum {
                    volume: volume.to_string(),
                    min: limits.min_volume.to_string(),
                });
            }
            if volume > limits.max_volume {
                return Err(ValidationError::VolumeAboveMaximum {
                    volume: volume.to_string(),
                    max: limits.max_volume.to_string(),
                });
            }
        }
    }

    if let Some(symbol) = &intent.symbol {
        if !limits.allowed_symbols.is_empty() && !limits.allowed_symbols.contains(symbol) {
            return Err(ValidationError::SymbolNotAllowed(symbol.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> ValidationLimits {
        ValidationLimits {
            min_volume: dec!(0.01),
            max_volume: dec!(10),
            allowed_symbols: Vec::new(),
        }
    }

    #[test]
    fn administrative_actions_need_nothing() {
        assert!(validate(&Intent::new(Action::EnableTradingHours), &limits()).is_ok());
    }

    #[test]
    fn trading_actions_need_a_symbol() {
        assert_eq!(
            validate(&Intent::new(Action::Buy), &limits()),
            Err(ValidationError::MissingField("symbol"))
        );
    }

    #[test]
    fn modify_needs_ticket_then_protection() {
        let mut intent = Intent::new(Action::Modify).with_symbol("EURUSD");
        intent.stop_loss = Some(dec!(1.05));
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::MissingField("ticket"))
        );

        intent.ticket = Some(42);
        intent.stop_loss = None;
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::MissingProtection)
        );

        intent.take_profit = Some(dec!(1.2));
        assert!(validate(&intent, &limits()).is_ok());
    }

    #[test]
    fn range_checks() {
        let mut intent = Intent::new(Action::Buy).with_symbol("EURUSD");
        intent.volume = Some(dec!(0));
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::NotPositive("volume"))
        );

        intent.volume = None;
        intent.stop_loss = Some(dec!(-1));
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::Negative("stop_loss"))
        );

        intent.stop_loss = None;
        intent.magic = Some(-3);
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::Negative("magic"))
        );

        intent.magic = None;
        intent.comment = Some("x".repeat(256));
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::CommentTooLong(256))
        );
    }

    #[test]
    fn comment_length_counts_characters() {
        let mut intent = Intent::new(Action::Sell).with_symbol("EURUSD");
        intent.comment = Some("突".repeat(MAX_COMMENT_CHARS));
        assert!(validate(&intent, &limits()).is_ok());
    }

    #[test]
    fn volume_limits_apply_to_opening_orders_only() {
        let mut intent = Intent::new(Action::Buy).with_symbol("EURUSD");
        intent.volume = Some(dec!(25));
        assert!(matches!(
            validate(&intent, &limits()),
            Err(ValidationError::VolumeAboveMaximum { .. })
        ));

        intent.volume = Some(dec!(0.001));
        assert!(matches!(
            validate(&intent, &limits()),
            Err(ValidationError::VolumeBelowMinimum { .. })
        ));

        let mut close = Intent::new(Action::Close).with_symbol("EURUSD");
        close.volume = Some(dec!(25));
        assert!(validate(&close, &limits()).is_ok());
    }

    #[test]
    fn allow_list() {
        let mut limits = limits();
        limits.allowed_symbols = vec!["XAUUSD".to_string()];

        let intent = Intent::new(Action::Buy).with_symbol("EURUSD");
        assert_eq!(
            validate(&intent, &limits),
            Err(ValidationError::SymbolNotAllowed("EURUSD".to_string()))
        );
        assert!(validate(&Intent::new(Action::Buy).with_symbol("XAUUSD"), &limits).is_ok());
    }

    #[test]
    fn symbol_charset_is_enforced() {
        let intent = Intent::new(Action::Buy).with_symbol("eur usd");
        assert_eq!(
            validate(&intent, &limits()),
            Err(ValidationError::InvalidSymbol("eur usd".to_string()))
        );
    }
}
