//! Exchange trading calendars.
//!
//! Table-driven session rules per exchange:
//! - regular open/close in exchange-local time (DST handled via `chrono-tz`)
//! - weekends always closed
//! - full-day holidays, either annual (month/day) or one-off dates
//! - early closes (half days) with their own closing time
//!
//! All inputs and outputs are UTC.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

/// Upper bound on how many calendar days a boundary search may scan.
const MAX_SEARCH_DAYS: i64 = 30;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalendarError {
    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),
    #[error("{exchange}: local time {local} does not exist")]
    InvalidLocalTime { exchange: String, local: String },
    #[error("{exchange}: no session within {days} days after {from}")]
    NoSession {
        exchange: String,
        from: DateTime<Utc>,
        days: i64,
    },
}

/// One trading session, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub date: NaiveDate,
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl Session {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.open <= ts && ts < self.close
    }
}

/// Market-hours oracle consumed by the clock, the loaders and the simulator.
pub trait TradingCalendar: Send + Sync {
    /// Session for an exchange-local date, or `None` on weekends/holidays.
    fn session(&self, exchange: &str, date: NaiveDate) -> Result<Option<Session>, CalendarError>;

    /// Exchange-local calendar date of a UTC instant.
    fn local_date(&self, exchange: &str, ts: DateTime<Utc>) -> Result<NaiveDate, CalendarError>;

    fn is_open(&self, exchange: &str, ts: DateTime<Utc>) -> Result<bool, CalendarError> {
        let date = self.local_date(exchange, ts)?;
        Ok(self
            .session(exchange, date)?
            .map_or(false, |s| s.contains(ts)))
    }

    /// First session open strictly after `ts`.
    fn next_open(&self, exchange: &str, ts: DateTime<Utc>) -> Result<DateTime<Utc>, CalendarError> {
        find_session(self, exchange, ts, |s| s.open > ts).map(|s| s.open)
    }

    /// First session close strictly after `ts`.
    fn next_close(
        &self,
        exchange: &str,
        ts: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CalendarError> {
        find_session(self, exchange, ts, |s| s.close > ts).map(|s| s.close)
    }
}

fn find_session<C, F>(
    cal: &C,
    exchange: &str,
    ts: DateTime<Utc>,
    accept: F,
) -> Result<Session, CalendarError>
where
    C: TradingCalendar + ?Sized,
    F: Fn(&Session) -> bool,
{
    let start = cal.local_date(exchange, ts)?;
    for offset in 0..MAX_SEARCH_DAYS {
        let date = start + Duration::days(offset);
        if let Some(session) = cal.session(exchange, date)? {
            if accept(&session) {
                return Ok(session);
            }
        }
    }
    Err(CalendarError::NoSession {
        exchange: exchange.to_string(),
        from: ts,
        days: MAX_SEARCH_DAYS,
    })
}

// ─── Rules ───────────────────────────────────────────────────────────

/// A date-matching rule for holidays and early closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayRule {
    /// Same month/day every year, no weekend observance shift.
    Annual { month: u32, day: u32 },
    /// A single date.
    Date(NaiveDate),
}

impl DayRule {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            DayRule::Annual { month, day } => date.month() == *month && date.day() == *day,
            DayRule::Date(d) => *d == date,
        }
    }
}

/// Session rules for one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeRules {
    pub code: String,
    pub tz: Tz,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub holidays: Vec<DayRule>,
    pub early_closes: Vec<(DayRule, NaiveTime)>,
}

impl ExchangeRules {
    /// New York Stock Exchange, 09:30–16:00 America/New_York.
    pub fn xnys() -> Self {
        Self {
            code: "XNYS".into(),
            tz: chrono_tz::America::New_York,
            open: hm(9, 30),
            close: hm(16, 0),
            holidays: vec![
                DayRule::Date(ymd(2024, 1, 15)),
                DayRule::Date(ymd(2024, 2, 19)),
                DayRule::Annual { month: 7, day: 4 },
            ],
            early_closes: Vec::new(),
        }
    }

    /// Xetra, 09:00–17:30 Europe/Berlin, Christmas Eve closes at 14:00.
    pub fn xetr() -> Self {
        Self {
            code: "XETR".into(),
            tz: chrono_tz::Europe::Berlin,
            open: hm(9, 0),
            close: hm(17, 30),
            holidays: Vec::new(),
            early_closes: vec![(DayRule::Annual { month: 12, day: 24 }, hm(14, 0))],
        }
    }

    pub fn is_session_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
            && !self.holidays.iter().any(|h| h.matches(date))
    }

    fn session_on(&self, date: NaiveDate) -> Result<Option<Session>, CalendarError> {
        if !self.is_session_day(date) {
            return Ok(None);
        }
        let close = self
            .early_closes
            .iter()
            .find(|(rule, _)| rule.matches(date))
            .map_or(self.close, |(_, t)| *t);
        Ok(Some(Session {
            date,
            open: self.to_utc(date, self.open)?,
            close: self.to_utc(date, close)?,
        }))
    }

    fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, CalendarError> {
        let local = date.and_time(time);
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| CalendarError::InvalidLocalTime {
                exchange: self.code.clone(),
                local: local.to_string(),
            })
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

// ─── Calendar ────────────────────────────────────────────────────────

/// Calendar over a set of exchanges, keyed by exchange code.
#[derive(Debug, Clone)]
pub struct ExchangeCalendar {
    exchanges: BTreeMap<String, ExchangeRules>,
}

impl Default for ExchangeCalendar {
    fn default() -> Self {
        Self::empty()
            .with_exchange(ExchangeRules::xnys())
            .with_exchange(ExchangeRules::xetr())
    }
}

impl ExchangeCalendar {
    pub fn empty() -> Self {
        Self {
            exchanges: BTreeMap::new(),
        }
    }

    /// Register (or replace) an exchange's rules.
    pub fn with_exchange(mut self, rules: ExchangeRules) -> Self {
        self.exchanges.insert(rules.code.clone(), rules);
        self
    }

    pub fn rules(&self, exchange: &str) -> Result<&ExchangeRules, CalendarError> {
        self.exchanges
            .get(exchange)
            .ok_or_else(|| CalendarError::UnsupportedExchange(exchange.to_string()))
    }

    pub fn supports(&self, exchange: &str) -> bool {
        self.exchanges.contains_key(exchange)
    }

    /// Exchange codes in sorted order.
    pub fn exchanges(&self) -> impl Iterator<Item = &str> {
        self.exchanges.keys().map(String::as_str)
    }
}

impl TradingCalendar for ExchangeCalendar {
    fn session(&self, exchange: &str, date: NaiveDate) -> Result<Option<Session>, CalendarError> {
        self.rules(exchange)?.session_on(date)
    }

    fn local_date(&self, exchange: &str, ts: DateTime<Utc>) -> Result<NaiveDate, CalendarError> {
        let rules = self.rules(exchange)?;
        Ok(ts.with_timezone(&rules.tz).date_naive())
    }
}
