// src/venue/paper.rs
use crate::domain::models::{
    AccountInfo, FillingMode, OrderRequest, OrderResult, OrderSide, Position, RequestAction,
    SymbolInfo, RETCODE_DONE,
};
use crate::venue::client::{VenueClient, VenueError};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

pub const RETCODE_INVALID: u32 = 10013;
pub const RETCODE_INVALID_VOLUME: u32 = 10014;
pub const RETCODE_TRADE_DISABLED: u32 = 10017;
pub const RETCODE_INVALID_FILL: u32 = 10030;
pub const RETCODE_POSITION_CLOSED: u32 = 10036;

const ERR_NO_CONNECTION: i32 = -10004;

/// Injected outcome for one order_send call
#[derive(Debug, Clone)]
pub enum SendFault {
    /// Terminal returns nothing and reports this error
    NoResult(VenueError),
    /// Terminal answers with a rejection
    Reject { retcode: u32, comment: String },
    /// Connection drops while the request is in flight
    Disconnect,
}

struct PaperState {
    connected: bool,
    symbols: BTreeMap<String, SymbolInfo>,
    positions: Vec<Position>,
    next_ticket: u64,
    account: AccountInfo,
    last_error: VenueError,
    send_faults: HashMap<usize, SendFault>,
    failing_connects: usize,
    connect_calls: usize,
    send_calls: usize,
    requests: Vec<OrderRequest>,
}

/// In-memory venue that fills every valid deal at the requested price
pub struct PaperVenue {
    state: Mutex<PaperState>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState {
                connected: false,
                symbols: BTreeMap::new(),
                positions: Vec::new(),
                next_ticket: 100_000,
                account: AccountInfo {
                    login: 5_000_001,
                    name: "Paper Account".to_string(),
                    server: "Paper-Demo".to_string(),
                    currency: "USD".to_string(),
                    balance: dec!(10000),
                    equity: dec!(10000),
                    free_margin: dec!(10000),
                    leverage: 100,
                },
                last_error: VenueError::none(),
                send_faults: HashMap::new(),
                failing_connects: 0,
                connect_calls: 0,
                send_calls: 0,
                requests: Vec::new(),
            }),
        }
    }

    /// A few FX and metal symbols with FOK/IOC filling
    pub fn with_default_book() -> Self {
        let venue = Self::new();
        venue.add_symbol(Self::quote("EURUSD", dec!(1.08500), dec!(1.08520)));
        venue.add_symbol(Self::quote("GBPUSD", dec!(1.26400), dec!(1.26425)));
        venue.add_symbol(Self::quote("USDJPY", dec!(151.200), dec!(151.215)));
        venue.add_symbol(Self::quote("XAUUSD", dec!(2350.10), dec!(2350.45)));
        venue
    }

    /// Standard lot limits (0.01 - 100, step 0.01) around a bid/ask quote
    pub fn quote(symbol: &str, bid: Decimal, ask: Decimal) -> SymbolInfo {
        SymbolInfo {
            name: symbol.to_string(),
            bid,
            ask,
            volume_min: dec!(0.01),
            volume_max: dec!(100),
            volume_step: dec!(0.01),
            filling_mode_flags: FillingMode::FLAG_FOK | FillingMode::FLAG_IOC,
            tradeable: true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_balance(self, balance: Decimal) -> Self {
        {
            let mut state = self.lock();
            state.account.balance = balance;
            state.account.equity = balance;
            state.account.free_margin = balance;
        }
        self
    }

    pub fn add_symbol(&self, info: SymbolInfo) {
        self.lock().symbols.insert(info.name.clone(), info);
    }

    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.lock().symbols.contains_key(symbol)
    }

    /// Seed an open position, returns its ticket
    pub fn open_position(
        &self,
        symbol: &str,
        side: OrderSide,
        volume: Decimal,
        price_open: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> u64 {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.push(Position {
            ticket,
            symbol: symbol.to_string(),
            side,
            volume,
            price_open,
            stop_loss,
            take_profit,
            profit: Decimal::ZERO,
            magic: 0,
            comment: String::new(),
        });
        ticket
    }

    pub fn drop_connection(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.last_error = VenueError::new(ERR_NO_CONNECTION, "No IPC connection");
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    /// Inject a fault into the `call`-th order_send (1-based, counted since the last reset)
    pub fn fail_send(&self, call: usize, fault: SendFault) {
        self.lock().send_faults.insert(call, fault);
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.connect_calls = 0;
        state.send_calls = 0;
        state.requests.clear();
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    pub fn send_calls(&self) -> usize {
        self.lock().send_calls
    }

    /// Every request received by order_send, in order
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.lock().requests.clone()
    }

    fn reply(ticket: u64, retcode: u32, price: Decimal, volume: Decimal, comment: &str) -> OrderResult {
        OrderResult {
            ticket,
            retcode,
            price,
            volume,
            comment: comment.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn reject(retcode: u32, comment: &str) -> OrderResult {
        Self::reply(0, retcode, Decimal::ZERO, Decimal::ZERO, comment)
    }

    fn execute(state: &mut PaperState, request: &OrderRequest) -> OrderResult {
        match request.action {
            RequestAction::Deal => match request.position {
                Some(ticket) => Self::close_deal(state, request, ticket),
                None => Self::open_deal(state, request),
            },
            RequestAction::Sltp => Self::change_protection(state, request),
        }
    }

    fn check_symbol(state: &PaperState, request: &OrderRequest) -> Result<(), OrderResult> {
        let info = match state.symbols.get(&request.symbol) {
            Some(info) => info,
            None => return Err(Self::reject(RETCODE_INVALID, "Invalid request")),
        };

        if !info.tradeable {
            return Err(Self::reject(RETCODE_TRADE_DISABLED, "Trade disabled"));
        }

        if request.volume < info.volume_min || request.volume > info.volume_max {
            return Err(Self::reject(RETCODE_INVALID_VOLUME, "Invalid volume"));
        }

        if let (Some(mode), Some(_)) = (request.filling, FillingMode::select(info.filling_mode_flags)) {
            let flag = match mode {
                FillingMode::FillOrKill => FillingMode::FLAG_FOK,
                FillingMode::ImmediateOrCancel => FillingMode::FLAG_IOC,
                FillingMode::Return => FillingMode::FLAG_RETURN,
            };
            if info.filling_mode_flags & flag == 0 {
                return Err(Self::reject(RETCODE_INVALID_FILL, "Unsupported filling mode"));
            }
        }

        Ok(())
    }

    fn open_deal(state: &mut PaperState, request: &OrderRequest) -> OrderResult {
        if let Err(rejection) = Self::check_symbol(state, request) {
            return rejection;
        }

        let side = match request.side {
            Some(side) => side,
            None => return Self::reject(RETCODE_INVALID, "Invalid request"),
        };

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.positions.push(Position {
            ticket,
            symbol: request.symbol.clone(),
            side,
            volume: request.volume,
            price_open: request.price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            profit: Decimal::ZERO,
            magic: request.magic,
            comment: request.comment.clone(),
        });

        Self::reply(ticket, RETCODE_DONE, request.price, request.volume, "Request executed")
    }

    fn close_deal(state: &mut PaperState, request: &OrderRequest, position_ticket: u64) -> OrderResult {
        if let Err(rejection) = Self::check_symbol(state, request) {
            return rejection;
        }

        let index = match state.positions.iter().position(|p| p.ticket == position_ticket) {
            Some(index) => index,
            None => return Self::reject(RETCODE_POSITION_CLOSED, "Position doesn't exist"),
        };

        let position = &mut state.positions[index];
        if request.volume > position.volume {
            return Self::reject(RETCODE_INVALID_VOLUME, "Invalid volume");
        }

        let sign = match position.side {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        };
        let realized = (request.price - position.price_open) * request.volume * sign;

        position.volume -= request.volume;
        if position.volume.is_zero() {
            state.positions.remove(index);
        }

        state.account.balance += realized;
        state.account.equity += realized;

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        Self::reply(ticket, RETCODE_DONE, request.price, request.volume, "Request executed")
    }

    fn change_protection(state: &mut PaperState, request: &OrderRequest) -> OrderResult {
        let ticket = match request.position {
            Some(ticket) => ticket,
            None => return Self::reject(RETCODE_INVALID, "Invalid request"),
        };

        match state.positions.iter_mut().find(|p| p.ticket == ticket) {
            Some(position) => {
                position.stop_loss = request.stop_loss;
                position.take_profit = request.take_profit;
                Self::reply(ticket, RETCODE_DONE, Decimal::ZERO, position.volume, "Request executed")
            }
            None => Self::reject(RETCODE_POSITION_CLOSED, "Position doesn't exist"),
        }
    }

    fn mark_profit(state: &PaperState, position: &Position) -> Position {
        let mut position = position.clone();
        if let Some(info) = state.symbols.get(&position.symbol) {
            position.profit = match position.side {
                OrderSide::Buy => (info.bid - position.price_open) * position.volume,
                OrderSide::Sell => (position.price_open - info.ask) * position.volume,
            };
        }
        position
    }
}

impl Default for PaperVenue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    async fn connect(&self) -> bool {
        let mut state = self.lock();
        state.connect_calls += 1;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.connected = false;
            state.last_error = VenueError::new(ERR_NO_CONNECTION, "Terminal initialization failed");
            return false;
        }

        state.connected = true;
        state.last_error = VenueError::none();
        true
    }

    async fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn account_info(&self) -> Option<AccountInfo> {
        let state = self.lock();
        state.connected.then(|| state.account.clone())
    }

    async fn symbol_info(&self, symbol: &str) -> Option<SymbolInfo> {
        let state = self.lock();
        if !state.connected {
            return None;
        }
        state.symbols.get(symbol).cloned()
    }

    async fn positions_get(&self, symbol: Option<&str>) -> Vec<Position> {
        let state = self.lock();
        if !state.connected {
            return Vec::new();
        }

        state
            .positions
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .map(|p| Self::mark_profit(&state, p))
            .collect()
    }

    async fn order_send(&self, request: &OrderRequest) -> Option<OrderResult> {
        let mut state = self.lock();
        state.send_calls += 1;
        state.requests.push(request.clone());

        if !state.connected {
            state.last_error = VenueError::new(ERR_NO_CONNECTION, "No IPC connection");
            return None;
        }

        let call = state.send_calls;
        if let Some(fault) = state.send_faults.remove(&call) {
            return match fault {
                SendFault::NoResult(error) => {
                    state.last_error = error;
                    None
                }
                SendFault::Reject { retcode, comment } => Some(Self::reject(retcode, &comment)),
                SendFault::Disconnect => {
                    state.connected = false;
                    state.last_error = VenueError::new(ERR_NO_CONNECTION, "No IPC connection");
                    None
                }
            };
        }

        Some(Self::execute(&mut state, request))
    }

    async fn last_error(&self) -> VenueError {
        self.lock().last_error.clone()
    }
}
