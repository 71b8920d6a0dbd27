// src/trading/hours.rs
use crate::config::TradingHoursConfig;
use crate::domain::errors::{
    AppError, AppResult, TradingError, TradingResult, ValidationError, ValidationResult,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Timezone of a trading window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneSpec {
    Named(Tz),
    Fixed(FixedOffset),
}

impl ZoneSpec {
    /// Accepts IANA names ("Europe/London", "UTC") and fixed offsets ("GMT+8", "UTC-5")
    pub fn parse(raw: &str) -> AppResult<ZoneSpec> {
        let trimmed = raw.trim();
        let upper = trimmed.to_uppercase();

        for prefix in ["GMT", "UTC"] {
            if let Some(rest) = upper.strip_prefix(prefix) {
                if rest.starts_with('+') || rest.starts_with('-') {
                    return Self::parse_offset(trimmed, rest);
                }
            }
        }

        trimmed
            .parse::<Tz>()
            .map(ZoneSpec::Named)
            .map_err(|_| AppError::Config(format!("Unknown timezone: {}", raw)))
    }

    fn parse_offset(raw: &str, rest: &str) -> AppResult<ZoneSpec> {
        let invalid = || AppError::Config(format!("Invalid UTC offset: {}", raw));

        let sign = if rest.starts_with('-') { -1 } else { 1 };
        let hours: i32 = rest[1..].parse().map_err(|_| invalid())?;
        if !(0..=23).contains(&hours) {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * hours * 3600)
            .map(ZoneSpec::Fixed)
            .ok_or_else(invalid)
    }

    pub fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            ZoneSpec::Named(tz) => now.with_timezone(tz).naive_local(),
            ZoneSpec::Fixed(offset) => now.with_timezone(offset).naive_local(),
        }
    }
}

/// A named daily window in local wall-clock time
#[derive(Debug, Clone, PartialEq)]
pub struct TradingInterval {
    pub id: String,
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub zone: ZoneSpec,
    pub zone_name: String,
    pub description: String,
}

impl TradingInterval {
    pub fn parse(
        id: &str,
        name: &str,
        start: &str,
        end: &str,
        timezone: &str,
        description: &str,
    ) -> AppResult<TradingInterval> {
        let parse_time = |value: &str| {
            NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
                AppError::Config(format!(
                    "Invalid time '{}' in trading interval {}: {}",
                    value, id, e
                ))
            })
        };

        Ok(TradingInterval {
            id: id.to_string(),
            name: name.to_string(),
            start: parse_time(start)?,
            end: parse_time(end)?,
            zone: ZoneSpec::parse(timezone)?,
            zone_name: timezone.to_string(),
            description: description.to_string(),
        })
    }

    /// Whether the local time of `now` falls inside the window, ends inclusive
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let current = self.zone.local(now).time();

        if self.start <= self.end {
            self.start <= current && current <= self.end
        } else {
            // Overnight window, e.g. 22:00 - 06:00
            current >= self.start || current <= self.end
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntervalStatus {
    pub id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
    pub description: String,
    pub current_time: String,
    pub current_date: String,
    pub open: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoursStatus {
    pub enabled: bool,
    pub trading_allowed: bool,
    pub intervals: Vec<IntervalStatus>,
}

/// Process-wide trading hours policy over every configured interval
pub struct TradingHoursGate {
    enabled: RwLock<bool>,
    intervals: BTreeMap<String, TradingInterval>,
}

impl TradingHoursGate {
    pub fn new(intervals: Vec<TradingInterval>) -> Self {
        log::info!(
            "Trading hours gate initialized with {} intervals",
            intervals.len()
        );

        Self {
            enabled: RwLock::new(false),
            intervals: intervals
                .into_iter()
                .map(|interval| (interval.id.clone(), interval))
                .collect(),
        }
    }

    pub fn from_config(config: &TradingHoursConfig) -> AppResult<Self> {
        Ok(Self::new(config.build_intervals()?))
    }

    /// Turn the restriction on. Refused when no interval is configured.
    pub fn enable(&self) -> ValidationResult<()> {
        if self.intervals.is_empty() {
            log::warn!("Cannot enable trading hours: no intervals configured");
            return Err(ValidationError::NoIntervalsConfigured);
        }

        self.set_enabled(true);
        log::info!(
            "Trading hours enabled for intervals: {}",
            self.intervals.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    pub fn disable(&self) {
        self.set_enabled(false);
        log::info!("All trading hours disabled");
    }

    fn set_enabled(&self, value: bool) {
        // A poisoned lock still holds a plain bool, so the write goes through
        let mut guard = match self.enabled.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = value;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.read().map(|guard| *guard).unwrap_or(true)
    }

    pub fn is_allowed(&self) -> bool {
        self.is_allowed_at(Utc::now(), false)
    }

    /// Evaluate the windows at `now`. `force` checks the windows even while disabled.
    /// Any evaluation fault denies trading.
    pub fn is_allowed_at(&self, now: DateTime<Utc>, force: bool) -> bool {
        match self.evaluate(now, force) {
            Ok(allowed) => allowed,
            Err(e) => {
                log::error!("Error checking trading hours, denying trade: {}", e);
                false
            }
        }
    }

    fn evaluate(&self, now: DateTime<Utc>, force: bool) -> Result<bool, String> {
        let enabled = *self
            .enabled
            .read()
            .map_err(|_| "trading hours state lock poisoned".to_string())?;

        if !enabled && !force {
            return Ok(true);
        }

        if self.intervals.is_empty() {
            return Ok(true);
        }

        if let Some(interval) = self.intervals.values().find(|i| i.contains(now)) {
            log::debug!(
                "Trading allowed in interval {} ({})",
                interval.id,
                interval.name
            );
            return Ok(true);
        }

        log::warn!(
            "Trading not allowed at current time. Active intervals: {:?}",
            self.intervals.keys().collect::<Vec<_>>()
        );
        Ok(false)
    }

    /// Gate a trading request
    pub fn check(&self, force: bool) -> TradingResult<()> {
        if self.is_allowed_at(Utc::now(), force) {
            Ok(())
        } else {
            Err(TradingError::OutsideTradingHours)
        }
    }

    pub fn status(&self) -> HoursStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> HoursStatus {
        let intervals = self
            .intervals
            .values()
            .map(|interval| {
                let local = interval.zone.local(now);
                IntervalStatus {
                    id: interval.id.clone(),
                    name: interval.name.clone(),
                    start_time: interval.start.format("%H:%M").to_string(),
                    end_time: interval.end.format("%H:%M").to_string(),
                    timezone: interval.zone_name.clone(),
                    description: interval.description.clone(),
                    current_time: local.format("%H:%M").to_string(),
                    current_date: local.format("%Y-%m-%d").to_string(),
                    open: interval.contains(now),
                }
            })
            .collect();

        HoursStatus {
            enabled: self.is_enabled(),
            trading_allowed: self.is_allowed_at(now, false),
            intervals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, hour, minute, 0).unwrap()
    }

    fn overnight_gate() -> TradingHoursGate {
        let interval =
            TradingInterval::parse("night", "Night", "22:00", "06:00", "UTC", "").unwrap();
        TradingHoursGate::new(vec![interval])
    }

    #[test]
    fn overnight_window() {
        let gate = overnight_gate();
        gate.enable().unwrap();

        assert!(gate.is_allowed_at(at(23, 0), false));
        assert!(gate.is_allowed_at(at(6, 0), false));
        assert!(gate.is_allowed_at(at(22, 0), false));
        assert!(!gate.is_allowed_at(at(12, 0), false));
        assert!(!gate.is_allowed_at(at(6, 1), false));
    }

    #[test]
    fn disabled_gate_allows_everything() {
        let gate = overnight_gate();
        assert!(gate.is_allowed_at(at(12, 0), false));

        gate.enable().unwrap();
        gate.disable();
        assert!(gate.is_allowed_at(at(12, 0), false));
    }

    #[test]
    fn forced_check_while_disabled() {
        let gate = overnight_gate();
        assert!(!gate.is_allowed_at(at(12, 0), true));
        assert!(gate.is_allowed_at(at(23, 30), true));
    }

    #[test]
    fn same_day_window_in_fixed_offset() {
        // 09:00-17:00 at GMT+8 is 01:00-09:00 UTC
        let interval =
            TradingInterval::parse("asia", "Asia", "09:00", "17:00", "GMT+8", "").unwrap();
        let gate = TradingHoursGate::new(vec![interval]);
        gate.enable().unwrap();

        assert!(gate.is_allowed_at(at(2, 0), false));
        assert!(!gate.is_allowed_at(at(10, 0), false));
    }

    #[test]
    fn named_zone_conversion() {
        let interval =
            TradingInterval::parse("ny", "New York", "09:30", "16:00", "America/New_York", "")
                .unwrap();
        // 14 March 2024 is daylight time, UTC-4
        assert!(interval.contains(at(14, 0)));
        assert!(!interval.contains(at(21, 0)));
    }

    #[test]
    fn enable_without_intervals_fails() {
        let gate = TradingHoursGate::new(Vec::new());
        assert_eq!(gate.enable(), Err(ValidationError::NoIntervalsConfigured));
        assert!(!gate.is_enabled());
    }

    #[test]
    fn zone_parsing() {
        assert!(matches!(ZoneSpec::parse("UTC"), Ok(ZoneSpec::Named(_))));
        assert!(matches!(ZoneSpec::parse("utc-5"), Ok(ZoneSpec::Fixed(_))));
        assert!(matches!(ZoneSpec::parse("GMT+23"), Ok(ZoneSpec::Fixed(_))));
        assert!(ZoneSpec::parse("GMT+24").is_err());
        assert!(ZoneSpec::parse("GMT+x").is_err());
        assert!(ZoneSpec::parse("Nowhere/Special").is_err());
    }

    #[test]
    fn status_reports_local_time() {
        let interval =
            TradingInterval::parse("asia", "Asia", "09:00", "17:00", "GMT+8", "").unwrap();
        let gate = TradingHoursGate::new(vec![interval]);

        let status = gate.status_at(at(23, 15));
        assert!(!status.enabled);
        assert!(status.trading_allowed);
        assert_eq!(status.intervals[0].current_time, "07:15");
        assert_eq!(status.intervals[0].current_date, "2024-03-15");
        assert!(!status.intervals[0].open);
    }
}
