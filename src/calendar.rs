//! Business-day calendar resolution

use crate::error::{Result, StockRankError};
use crate::types::{parse_trade_date, DATE_FORMAT};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Weekday};
use chrono_tz::Tz;
use hashbrown::HashSet;

/// How far back the previous-business-day scan goes before giving up.
///
/// Longer exchange closures do not exist, so hitting the bound means the
/// holiday feed is broken.
pub const MAX_LOOKBACK_DAYS: u32 = 30;

/// Check if date is a weekend
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Business calendar trait
pub trait BusinessCalendar: Send + Sync {
    /// Check if a date is a business day
    fn is_business_day(&self, date: NaiveDate) -> bool;

    /// Get the closest business day strictly before `date`
    fn previous_business_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        for offset in 1..=MAX_LOOKBACK_DAYS {
            let candidate = date - Duration::days(offset as i64);
            if self.is_business_day(candidate) {
                return Ok(candidate);
            }
        }
        Err(StockRankError::NoBusinessDayFound {
            from: date,
            days: MAX_LOOKBACK_DAYS,
        })
    }

    /// Whether the calendar day right before `date` was itself a business day.
    ///
    /// False also when no business day can be found at all.
    fn is_previous_day_business_day(&self, date: NaiveDate) -> bool {
        match self.previous_business_day(date) {
            Ok(previous) => previous + Duration::days(1) == date,
            Err(_) => false,
        }
    }
}

/// Exchange holidays. Weekends are never listed here; they are always closed.
#[derive(Debug, Clone, Default)]
pub struct HolidaySet {
    dates: HashSet<NaiveDate>,
}

impl HolidaySet {
    /// Create an empty holiday set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-parsed dates
    pub fn from_dates<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Build from `YYYY/MM/DD` strings as delivered by the calendar feed
    pub fn parse<I, S>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dates = HashSet::new();
        for value in raw {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
                StockRankError::ParseError(format!("bad holiday '{}': {}", value, e))
            })?;
            dates.insert(date);
        }
        Ok(Self { dates })
    }

    /// Add a custom holiday
    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.dates.insert(date);
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl BusinessCalendar for HolidaySet {
    fn is_business_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.contains(date)
    }
}

/// Resolves business days in the exchange timezone.
///
/// In bypass mode both run gates report `true` so test pipelines do not
/// depend on the live calendar. Bypass only comes from an explicit run mode.
#[derive(Debug, Clone)]
pub struct CalendarResolver {
    holidays: HolidaySet,
    timezone: Tz,
    bypass: bool,
}

impl CalendarResolver {
    /// Create a resolver that consults the holiday set
    pub fn new(holidays: HolidaySet, timezone: Tz) -> Self {
        Self {
            holidays,
            timezone,
            bypass: false,
        }
    }

    /// Create a resolver whose run gates always pass
    pub fn bypassed(holidays: HolidaySet, timezone: Tz) -> Self {
        Self {
            holidays,
            timezone,
            bypass: true,
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn holidays(&self) -> &HolidaySet {
        &self.holidays
    }

    /// Calendar day of `now` in the exchange timezone
    pub fn local_date<T: TimeZone>(&self, now: &DateTime<T>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Closest business day strictly before `now`. Never bypassed.
    pub fn previous_business_day(&self, now: NaiveDate) -> Result<NaiveDate> {
        self.holidays.previous_business_day(now)
    }

    /// Gate: did the day before `now` trade, so new data should exist?
    pub fn is_previous_day_business_day(&self, now: NaiveDate) -> bool {
        if self.bypass {
            return true;
        }
        let result = self.holidays.is_previous_day_business_day(now);
        log::debug!("previous day of {} is business day: {}", now, result);
        result
    }

    /// Gate: is `now` itself a business day?
    pub fn is_business_day(&self, now: NaiveDate) -> bool {
        if self.bypass {
            return true;
        }
        self.holidays.is_business_day(now)
    }
}

/// Parse a `--date` style argument using the same rules as price rows
pub fn parse_calendar_date(raw: &str, today: NaiveDate) -> Result<NaiveDate> {
    parse_trade_date(raw, today)
}
