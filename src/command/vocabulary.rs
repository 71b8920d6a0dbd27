// src/command/vocabulary.rs
// Word tables for the text command grammar

use crate::domain::models::{Action, OrderSide};

/// Action spellings. Latin entries match case-insensitively.
const ACTIONS: &[(&str, Action, Option<OrderSide>)] = &[
    ("开多", Action::Buy, None),
    ("买入", Action::Buy, None),
    ("做多", Action::Buy, None),
    ("buy", Action::Buy, None),
    ("long", Action::Buy, None),
    ("开空", Action::Sell, None),
    ("卖出", Action::Sell, None),
    ("做空", Action::Sell, None),
    ("sell", Action::Sell, None),
    ("short", Action::Sell, None),
    ("平仓", Action::Close, None),
    ("close", Action::Close, None),
    ("平多", Action::Close, Some(OrderSide::Buy)),
    ("close_long", Action::Close, Some(OrderSide::Buy)),
    ("平空", Action::Close, Some(OrderSide::Sell)),
    ("close_short", Action::Close, Some(OrderSide::Sell)),
    ("全平", Action::CloseAll, None),
    ("close_all", Action::CloseAll, None),
    ("closeall", Action::CloseAll, None),
    ("修改", Action::Modify, None),
    ("modify", Action::Modify, None),
    ("开启时间区间", Action::EnableTradingHours, None),
    ("enable_trading_hours", Action::EnableTradingHours, None),
    ("关闭时间区间", Action::DisableTradingHours, None),
    ("disable_trading_hours", Action::DisableTradingHours, None),
];

/// Administrative phrases that may span several words, mapped to their single-token form
const KEYWORD_PHRASES: &[(&str, &str)] = &[
    ("开启时间区间", "开启时间区间"),
    ("关闭时间区间", "关闭时间区间"),
    ("enable trading hours", "enable_trading_hours"),
    ("disable trading hours", "disable_trading_hours"),
];

/// Canonical keyed fields of an Intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Volume,
    StopLoss,
    TakeProfit,
    Price,
    Comment,
    Magic,
    Ticket,
    Deviation,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::Volume => "volume",
            Field::StopLoss => "sl",
            Field::TakeProfit => "tp",
            Field::Price => "price",
            Field::Comment => "comment",
            Field::Magic => "magic",
            Field::Ticket => "ticket",
            Field::Deviation => "deviation",
        }
    }
}

const FIELDS: &[(&str, Field)] = &[
    ("仓位", Field::Volume),
    ("数量", Field::Volume),
    ("手数", Field::Volume),
    ("volume", Field::Volume),
    ("lots", Field::Volume),
    ("止损", Field::StopLoss),
    ("止损价", Field::StopLoss),
    ("止损价格", Field::StopLoss),
    ("sl", Field::StopLoss),
    ("stop_loss", Field::StopLoss),
    ("止盈", Field::TakeProfit),
    ("止盈价", Field::TakeProfit),
    ("止盈价格", Field::TakeProfit),
    ("tp", Field::TakeProfit),
    ("take_profit", Field::TakeProfit),
    ("价格", Field::Price),
    ("开仓价", Field::Price),
    ("开仓价格", Field::Price),
    ("price", Field::Price),
    ("备注", Field::Comment),
    ("注释", Field::Comment),
    ("说明", Field::Comment),
    ("comment", Field::Comment),
    ("魔术数", Field::Magic),
    ("魔术数字", Field::Magic),
    ("magic", Field::Magic),
    ("订单号", Field::Ticket),
    ("票号", Field::Ticket),
    ("持仓号", Field::Ticket),
    ("ticket", Field::Ticket),
    ("滑点", Field::Deviation),
    ("最大滑点", Field::Deviation),
    ("deviation", Field::Deviation),
];

pub const SWITCH_ENABLE_TIME_CHECK: &str = "enable_time_check";
pub const SWITCH_ALLOW_SLIPPAGE: &str = "allow_slippage";

const SWITCHES: &[(&str, &str)] = &[
    ("允许滑点", SWITCH_ALLOW_SLIPPAGE),
    ("强制平仓", "force_close"),
    ("部分平仓", "partial_close"),
    ("立即执行", "immediate"),
    ("市价单", "market_order"),
    ("限价单", "limit_order"),
    ("开启时间区间", SWITCH_ENABLE_TIME_CHECK),
];

fn find<'a, T: Copy>(table: &'a [(&'a str, T)], token: &str) -> Option<T> {
    table
        .iter()
        .find(|(word, _)| word.eq_ignore_ascii_case(token))
        .map(|(_, value)| *value)
}

pub fn lookup_action(token: &str) -> Option<(Action, Option<OrderSide>)> {
    ACTIONS
        .iter()
        .find(|(word, _, _)| word.eq_ignore_ascii_case(token))
        .map(|(_, action, side)| (*action, *side))
}

pub fn lookup_field(key: &str) -> Option<Field> {
    find(FIELDS, key)
}

pub fn lookup_switch(token: &str) -> Option<&'static str> {
    find(SWITCHES, token)
}

/// Longest administrative phrase the message starts with, as (single token, byte length)
pub fn match_keyword_prefix(message: &str) -> Option<(&'static str, usize)> {
    KEYWORD_PHRASES
        .iter()
        .filter(|(phrase, _)| {
            message
                .get(..phrase.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(phrase))
        })
        .max_by_key(|(phrase, _)| phrase.len())
        .map(|(phrase, token)| (*token, phrase.len()))
}

/// Every spelling that maps to `action`, for exhaustive checks
pub fn action_spellings(action: Action) -> Vec<&'static str> {
    ACTIONS
        .iter()
        .filter(|(_, a, _)| *a == action)
        .map(|(word, _, _)| *word)
        .collect()
}

/// Symbols are upper-case letters, digits and `._/-`
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || "._/-".contains(c))
}
