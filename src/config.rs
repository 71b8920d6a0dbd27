// src/config.rs
use crate::domain::errors::{AppError, AppResult};
use crate::trading::hours::{TradingInterval, ZoneSpec};
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Venue connection settings
    #[serde(default)]
    pub venue: VenueConfig,

    /// Trading limits and order defaults
    pub trading: TradingConfig,

    /// Trading hours windows
    #[serde(default)]
    pub trading_hours: TradingHoursConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Venue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Paper venue starting balance
    #[serde(default = "default_paper_balance")]
    pub paper_balance: Decimal,
}

fn default_paper_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            paper_balance: default_paper_balance(),
        }
    }
}

/// Trading limits consumed by the validator and executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Volume used when a buy/sell carries none
    pub default_volume: Decimal,

    pub min_volume: Decimal,

    pub max_volume: Decimal,

    /// Magic number stamped on orders without one
    pub magic_number: i64,

    /// Max price deviation in points, 0 disables it
    pub max_slippage: u32,

    /// Empty means every symbol is allowed
    #[serde(default)]
    pub allowed_symbols: Vec<String>,

    /// Hold webhook orders until the next whole minute
    #[serde(default = "default_align")]
    pub align_to_minute: bool,
}

fn default_align() -> bool {
    true
}

/// One configured trading window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub name: String,

    /// "HH:MM" local wall clock
    pub start_time: String,

    /// "HH:MM" local wall clock, may be earlier than start for overnight windows
    pub end_time: String,

    /// IANA zone name or GMT+N / UTC-N; falls back to the section default
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingHoursConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub intervals: BTreeMap<String, IntervalConfig>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for TradingHoursConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            intervals: BTreeMap::new(),
        }
    }
}

impl TradingHoursConfig {
    /// Resolve every configured interval
    pub fn build_intervals(&self) -> AppResult<Vec<TradingInterval>> {
        self.intervals
            .iter()
            .map(|(id, interval)| {
                let zone = interval.timezone.as_deref().unwrap_or(&self.timezone);
                TradingInterval::parse(
                    id,
                    &interval.name,
                    &interval.start_time,
                    &interval.end_time,
                    zone,
                    &interval.description,
                )
            })
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            file_path: None,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let venue_config = VenueConfig {
            paper_balance: env_or("PAPER_BALANCE", defaults.venue.paper_balance),
        };

        let allowed_symbols = env::var("ALLOWED_SYMBOLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let trading_config = TradingConfig {
            default_volume: env_or("DEFAULT_VOLUME", defaults.trading.default_volume),
            min_volume: env_or("MIN_VOLUME", defaults.trading.min_volume),
            max_volume: env_or("MAX_VOLUME", defaults.trading.max_volume),
            magic_number: env_or("MAGIC_NUMBER", defaults.trading.magic_number),
            max_slippage: env_or("MAX_SLIPPAGE", defaults.trading.max_slippage),
            allowed_symbols,
            align_to_minute: env_or("ALIGN_TO_MINUTE", true),
        };

        // Intervals only come from a config file; the zone default can be overridden
        let trading_hours = TradingHoursConfig {
            timezone: env::var("TRADING_HOURS_TIMEZONE").unwrap_or_else(|_| default_timezone()),
            intervals: BTreeMap::new(),
        };

        let logging_config = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env_or("LOG_TO_FILE", false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            venue: venue_config,
            trading: trading_config,
            trading_hours,
            logging: logging_config,
        };
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> AppResult<Self> {
        let config: Config = serde_json::from_str(contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Check volume relationships, magic number and interval definitions
    pub fn validate(&self) -> AppResult<()> {
        let trading = &self.trading;

        for (field, value) in [
            ("default_volume", trading.default_volume),
            ("min_volume", trading.min_volume),
            ("max_volume", trading.max_volume),
        ] {
            if value <= Decimal::ZERO {
                return Err(AppError::Config(format!(
                    "Trading {} must be a positive number",
                    field
                )));
            }
        }

        if !(trading.min_volume <= trading.default_volume
            && trading.default_volume <= trading.max_volume)
        {
            return Err(AppError::Config(
                "Volume settings must satisfy: min_volume <= default_volume <= max_volume"
                    .to_string(),
            ));
        }

        if trading.magic_number < 0 {
            return Err(AppError::Config(
                "Magic number must be a non-negative integer".to_string(),
            ));
        }

        ZoneSpec::parse(&self.trading_hours.timezone)?;
        self.trading_hours.build_intervals()?;

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" | "warning" => log::LevelFilter::Warn,
            "error" | "critical" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder.try_init().map_err(|e| {
            AppError::Config(format!("Failed to initialize logger: {}", e))
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            trading: TradingConfig {
                default_volume: Decimal::new(1, 1),
                min_volume: Decimal::new(1, 2),
                max_volume: Decimal::new(100, 0),
                magic_number: 12345,
                max_slippage: 3,
                allowed_symbols: Vec::new(),
                align_to_minute: true,
            },
            trading_hours: TradingHoursConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
