// src/command/parser.rs
// Parsers turning webhook bodies into Intents

use crate::command::vocabulary::{
    self, Field, SWITCH_ALLOW_SLIPPAGE, SWITCH_ENABLE_TIME_CHECK,
};
use crate::domain::errors::{ParseError, ParseResult};
use crate::domain::models::{Intent, OrderSide, ParamValue};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Deviation implied by the allow-slippage switch when none is given
pub const DEFAULT_SLIPPAGE_POINTS: u32 = 10;

/// Parse a raw body: JSON objects take the keyed form, anything else the token form
pub fn parse(raw: &str) -> ParseResult<Intent> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        let payload: Value = serde_json::from_str(trimmed)
            .map_err(|e| ParseError::InvalidPayload(e.to_string()))?;
        parse_payload(&payload)
    } else {
        parse_text(trimmed)
    }
}

/// Coerce a text value: decimal if it has a point, else integer, else text
pub fn coerce(value: &str) -> Option<ParamValue> {
    if value.is_empty() {
        return None;
    }

    if value.contains('.') {
        if let Ok(number) = Decimal::from_str(value) {
            return Some(ParamValue::Float(number));
        }
    } else if let Ok(number) = value.parse::<i64>() {
        return Some(ParamValue::Int(number));
    }

    Some(ParamValue::Text(value.to_string()))
}

/// Split on whitespace, keeping a leading administrative phrase as one token
pub fn split_tokens(message: &str) -> Vec<String> {
    if let Some((keyword, len)) = vocabulary::match_keyword_prefix(message) {
        let mut tokens = vec![keyword.to_string()];
        tokens.extend(message[len..].split_whitespace().map(str::to_string));
        return tokens;
    }

    message.split_whitespace().map(str::to_string).collect()
}

/// Parse the token grammar: `<action> [symbol] [key=value | switch]...`
pub fn parse_text(message: &str) -> ParseResult<Intent> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens = split_tokens(message);
    let (action_token, mut rest) = match tokens.split_first() {
        Some((first, rest)) => (first, rest),
        None => return Err(ParseError::Empty),
    };

    let (action, close_side) = vocabulary::lookup_action(action_token)
        .ok_or_else(|| ParseError::UnknownAction(action_token.clone()))?;

    let mut intent = Intent::new(action);
    intent.close_side = close_side;

    if action.is_trading() {
        let (symbol_token, remaining) = rest
            .split_first()
            .ok_or_else(|| ParseError::MissingSymbol(action.to_string()))?;

        let symbol = symbol_token.to_uppercase();
        if !vocabulary::is_valid_symbol(&symbol) {
            return Err(ParseError::InvalidSymbol(symbol));
        }

        intent.symbol = Some(symbol);
        rest = remaining;
    }

    for token in rest {
        apply_token(&mut intent, token)?;
    }

    if intent.switches.contains(SWITCH_ALLOW_SLIPPAGE) && intent.deviation.is_none() {
        intent.deviation = Some(DEFAULT_SLIPPAGE_POINTS);
    }

    Ok(intent)
}

fn apply_token(intent: &mut Intent, token: &str) -> ParseResult<()> {
    match token.split_once('=') {
        Some((key, raw_value)) => {
            let value = match coerce(raw_value) {
                Some(value) => value,
                None => return Ok(()),
            };

            match vocabulary::lookup_field(key) {
                Some(field) => assign(intent, field, value)?,
                None => {
                    intent.extras.insert(key.to_lowercase(), value);
                }
            }
        }
        None => match vocabulary::lookup_switch(token) {
            Some(SWITCH_ENABLE_TIME_CHECK) => intent.enable_time_check = true,
            Some(switch) => {
                intent.switches.insert(switch.to_string());
            }
            None => {
                intent.switches.insert(format!("switch_{}", token));
            }
        },
    }

    Ok(())
}

fn invalid(field: Field, value: &ParamValue) -> ParseError {
    ParseError::InvalidField {
        field: field.name().to_string(),
        value: value.to_string(),
    }
}

fn assign(intent: &mut Intent, field: Field, value: ParamValue) -> ParseResult<()> {
    match field {
        Field::Volume | Field::StopLoss | Field::TakeProfit | Field::Price => {
            let number = value.as_decimal().ok_or_else(|| invalid(field, &value))?;
            let slot = match field {
                Field::Volume => &mut intent.volume,
                Field::StopLoss => &mut intent.stop_loss,
                Field::TakeProfit => &mut intent.take_profit,
                _ => &mut intent.price,
            };
            *slot = Some(number);
        }
        Field::Magic => {
            intent.magic = Some(value.as_integer().ok_or_else(|| invalid(field, &value))?);
        }
        Field::Ticket => {
            let ticket = value
                .as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| invalid(field, &value))?;
            intent.ticket = Some(ticket);
        }
        Field::Deviation => {
            let points = value
                .as_integer()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid(field, &value))?;
            intent.deviation = Some(points);
        }
        Field::Comment => intent.comment = Some(value.to_string()),
    }

    Ok(())
}

fn invalid_json(field: &str, value: &Value) -> ParseError {
    ParseError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// First present, non-null value among `keys`, with the key it was found under
fn lookup<'a>(
    object: &'a Map<String, Value>,
    keys: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    keys.iter().find_map(|key| match object.get(*key) {
        None | Some(Value::Null) => None,
        Some(value) => Some((*key, value)),
    })
}

fn decimal_field(
    object: &Map<String, Value>,
    keys: &[&'static str],
) -> ParseResult<Option<Decimal>> {
    let (key, value) = match lookup(object, keys) {
        Some(found) => found,
        None => return Ok(None),
    };

    let text = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return Err(invalid_json(key, value)),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| invalid_json(key, value))
}

fn integer_field(object: &Map<String, Value>, key: &'static str) -> ParseResult<Option<i64>> {
    let value = match lookup(object, &[key]) {
        Some((_, value)) => value,
        None => return Ok(None),
    };

    let number = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    number.map(Some).ok_or_else(|| invalid_json(key, value))
}

/// Parse the keyed form. A string `message` field is handed to the token grammar instead.
pub fn parse_payload(payload: &Value) -> ParseResult<Intent> {
    let object = payload
        .as_object()
        .ok_or_else(|| ParseError::InvalidPayload("expected a JSON object".to_string()))?;

    if let Some(Value::String(message)) = object.get("message") {
        log::info!("Parsing text command from JSON message: {}", message);
        return parse_text(message);
    }

    let action_raw = match object.get("action") {
        Some(Value::String(action)) => action.trim(),
        Some(other) => return Err(invalid_json("action", other)),
        None => return Err(ParseError::MissingField("action".to_string())),
    };

    let (action, close_side) = vocabulary::lookup_action(action_raw)
        .ok_or_else(|| ParseError::UnknownAction(action_raw.to_string()))?;

    let mut intent = Intent::new(action);
    intent.close_side = close_side;

    intent.symbol = match lookup(object, &["symbol"]) {
        Some((_, Value::String(symbol))) => Some(symbol.trim().to_uppercase()),
        Some((key, other)) => return Err(invalid_json(key, other)),
        None => None,
    };

    intent.volume = decimal_field(object, &["volume"])?;
    intent.stop_loss = decimal_field(object, &["sl", "stop_loss"])?;
    intent.take_profit = decimal_field(object, &["tp", "take_profit"])?;
    intent.price = decimal_field(object, &["price"])?;
    intent.magic = integer_field(object, "magic")?;

    intent.comment = match lookup(object, &["comment"]) {
        Some((_, Value::String(comment))) => Some(comment.clone()),
        Some((key, other)) => return Err(invalid_json(key, other)),
        None => None,
    };

    if let Some(ticket) = integer_field(object, "ticket")? {
        let ticket = u64::try_from(ticket)
            .map_err(|_| invalid_json("ticket", &Value::from(ticket)))?;
        intent.ticket = Some(ticket);
    }

    if let Some(points) = integer_field(object, "deviation")? {
        let points = u32::try_from(points)
            .map_err(|_| invalid_json("deviation", &Value::from(points)))?;
        intent.deviation = Some(points);
    }

    intent.enable_time_check = match lookup(object, &["enable_time_check"]) {
        Some((_, Value::Bool(flag))) => *flag,
        Some((key, other)) => return Err(invalid_json(key, other)),
        None => false,
    };

    if intent.close_side.is_none() {
        intent.close_side = match lookup(object, &["close_type"]) {
            Some((_, Value::String(kind))) if kind.eq_ignore_ascii_case("long") => Some(OrderSide::Buy),
            Some((_, Value::String(kind))) if kind.eq_ignore_ascii_case("short") => Some(OrderSide::Sell),
            Some((key, other)) => return Err(invalid_json(key, other)),
            None => None,
        };
    }

    Ok(intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::vocabulary::action_spellings;
    use crate::domain::models::Action;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn every_spelling_yields_its_canonical_action() {
        for action in Action::ALL {
            for spelling in action_spellings(action) {
                let message = if action.is_trading() {
                    format!("{} EURUSD", spelling)
                } else {
                    spelling.to_string()
                };
                assert_eq!(parse_text(&message).unwrap().action, action, "{}", spelling);

                let payload = json!({"action": spelling, "symbol": "EURUSD"});
                assert_eq!(parse_payload(&payload).unwrap().action, action, "{}", spelling);
            }
        }
    }

    #[test]
    fn parses_cjk_command_with_parameters() {
        let intent = parse_text("开多 xauusd 仓位=0.5 止损=2300.5 止盈=2400 备注=突破 魔术数=99").unwrap();

        assert_eq!(intent.action, Action::Buy);
        assert_eq!(intent.symbol.as_deref(), Some("XAUUSD"));
        assert_eq!(intent.volume, Some(dec!(0.5)));
        assert_eq!(intent.stop_loss, Some(dec!(2300.5)));
        assert_eq!(intent.take_profit, Some(dec!(2400)));
        assert_eq!(intent.comment.as_deref(), Some("突破"));
        assert_eq!(intent.magic, Some(99));
    }

    #[test]
    fn close_synonyms_carry_a_side_filter() {
        assert_eq!(parse_text("平多 EURUSD").unwrap().close_side, Some(OrderSide::Buy));
        assert_eq!(parse_text("平空 EURUSD").unwrap().close_side, Some(OrderSide::Sell));
        assert_eq!(parse_text("平仓 EURUSD").unwrap().close_side, None);
    }

    #[test]
    fn administrative_phrases_take_no_symbol() {
        let intent = parse_text("开启时间区间").unwrap();
        assert_eq!(intent.action, Action::EnableTradingHours);
        assert_eq!(intent.symbol, None);

        let intent = parse_text("disable trading hours").unwrap();
        assert_eq!(intent.action, Action::DisableTradingHours);
    }

    #[test]
    fn unknown_action_names_the_token() {
        assert_eq!(
            parse_text("跳舞 EURUSD"),
            Err(ParseError::UnknownAction("跳舞".to_string()))
        );
        assert_eq!(parse_text("   "), Err(ParseError::Empty));
    }

    #[test]
    fn trading_actions_require_a_valid_symbol() {
        assert_eq!(
            parse_text("buy"),
            Err(ParseError::MissingSymbol("buy".to_string()))
        );
        assert_eq!(
            parse_text("buy EUR$USD"),
            Err(ParseError::InvalidSymbol("EUR$USD".to_string()))
        );
    }

    #[test]
    fn switches_and_pass_through_keys() {
        let intent = parse_text("sell EURUSD 允许滑点 立即执行 wobble Strategy=Breakout 开启时间区间").unwrap();

        assert!(intent.switches.contains("allow_slippage"));
        assert!(intent.switches.contains("immediate"));
        assert!(intent.switches.contains("switch_wobble"));
        assert!(intent.enable_time_check);
        assert_eq!(intent.deviation, Some(DEFAULT_SLIPPAGE_POINTS));
        assert_eq!(
            intent.extras.get("strategy"),
            Some(&ParamValue::Text("Breakout".to_string()))
        );
    }

    #[test]
    fn explicit_deviation_wins_over_switch() {
        let intent = parse_text("buy EURUSD 允许滑点 滑点=25").unwrap();
        assert_eq!(intent.deviation, Some(25));
    }

    #[test]
    fn numeric_field_with_text_value_is_rejected() {
        assert_eq!(
            parse_text("buy EURUSD volume=lots"),
            Err(ParseError::InvalidField {
                field: "volume".to_string(),
                value: "lots".to_string(),
            })
        );
        assert!(parse_text("修改 EURUSD 订单号=-5").is_err());
    }

    #[test]
    fn empty_values_are_ignored() {
        let intent = parse_text("buy EURUSD sl= tp=1.2").unwrap();
        assert_eq!(intent.stop_loss, None);
        assert_eq!(intent.take_profit, Some(dec!(1.2)));
    }

    #[test]
    fn coercion_rules() {
        assert_eq!(coerce("0.25"), Some(ParamValue::Float(dec!(0.25))));
        assert_eq!(coerce("42"), Some(ParamValue::Int(42)));
        assert_eq!(coerce("1.2.3"), Some(ParamValue::Text("1.2.3".to_string())));
        assert_eq!(coerce("abc"), Some(ParamValue::Text("abc".to_string())));
        assert_eq!(coerce(""), None);
    }

    #[test]
    fn keyed_payload_fields() {
        let payload = json!({
            "action": "modify",
            "symbol": "eurusd",
            "sl": 1.0800,
            "take_profit": "1.0950",
            "ticket": 123456,
            "magic": 7,
            "comment": "trail",
            "enable_time_check": true
        });

        let intent = parse_payload(&payload).unwrap();
        assert_eq!(intent.action, Action::Modify);
        assert_eq!(intent.symbol.as_deref(), Some("EURUSD"));
        assert_eq!(intent.stop_loss, Some(dec!(1.08)));
        assert_eq!(intent.take_profit, Some(dec!(1.095)));
        assert_eq!(intent.ticket, Some(123456));
        assert_eq!(intent.magic, Some(7));
        assert!(intent.enable_time_check);
    }

    #[test]
    fn keyed_payload_type_errors_name_the_field() {
        let payload = json!({"action": "buy", "symbol": "EURUSD", "volume": [1]});
        assert!(matches!(
            parse_payload(&payload),
            Err(ParseError::InvalidField { field, .. }) if field == "volume"
        ));

        let payload = json!({"action": "buy", "symbol": "EURUSD", "magic": 1.5});
        assert!(matches!(
            parse_payload(&payload),
            Err(ParseError::InvalidField { field, .. }) if field == "magic"
        ));

        let payload = json!({"symbol": "EURUSD"});
        assert_eq!(
            parse_payload(&payload),
            Err(ParseError::MissingField("action".to_string()))
        );
    }

    #[test]
    fn message_field_uses_token_grammar() {
        let intent = parse(r#"{"message": "全平 GBPUSD"}"#).unwrap();
        assert_eq!(intent.action, Action::CloseAll);
        assert_eq!(intent.symbol.as_deref(), Some("GBPUSD"));

        assert!(matches!(parse("{not json"), Err(ParseError::InvalidPayload(_))));
    }

    #[test]
    fn close_type_in_payload() {
        let payload = json!({"action": "close", "symbol": "EURUSD", "close_type": "short"});
        assert_eq!(parse_payload(&payload).unwrap().close_side, Some(OrderSide::Sell));
    }
}
