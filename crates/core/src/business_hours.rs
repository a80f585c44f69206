//! Business-hours window used to place chained follow-ups.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::CoreError;

/// Days to scan forward before giving up on finding an open window.
const MAX_SCAN_DAYS: i64 = 14;

/// Allowed sending window: local hours `[start_hour, end_hour)` on `days`, in `tz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    tz: Tz,
    start_hour: u32,
    end_hour: u32,
    days: Vec<Weekday>,
}

impl BusinessHours {
    pub fn new(tz: Tz, start_hour: u32, end_hour: u32, days: Vec<Weekday>) -> Result<Self, CoreError> {
        if start_hour >= end_hour || end_hour > 24 {
            return Err(CoreError::InvalidBusinessHours(format!(
                "window {start_hour}..{end_hour} is empty or out of range"
            )));
        }
        if days.is_empty() {
            return Err(CoreError::InvalidBusinessHours("no business days configured".to_owned()));
        }
        Ok(Self { tz, start_hour, end_hour, days })
    }

    /// Window that is open at every instant.
    #[must_use]
    pub fn always_open() -> Self {
        Self {
            tz: Tz::UTC,
            start_hour: 0,
            end_hour: 24,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }

    /// Parses a comma-separated weekday list such as `mon,tue,wed`.
    pub fn parse_days(raw: &str) -> Result<Vec<Weekday>, CoreError> {
        raw.split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| {
                d.parse::<Weekday>()
                    .map_err(|_| CoreError::InvalidBusinessHours(format!("unknown weekday: {d}")))
            })
            .collect()
    }

    pub fn parse_tz(raw: &str) -> Result<Tz, CoreError> {
        raw.trim()
            .parse::<Tz>()
            .map_err(|_| CoreError::InvalidBusinessHours(format!("invalid timezone: {raw}")))
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    #[must_use]
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.tz);
        self.days.contains(&local.weekday())
            && local.hour() >= self.start_hour
            && local.hour() < self.end_hour
    }

    /// Moves `at` forward to the next instant inside the window.
    ///
    /// Returns `at` unchanged when it is already open. Never returns an earlier
    /// instant and never lands on an excluded day.
    #[must_use]
    pub fn shift_forward(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(at) {
            return at;
        }
        let local_date = at.with_timezone(&self.tz).date_naive();
        for offset in 0..=MAX_SCAN_DAYS {
            let Some(date) = local_date.checked_add_signed(Duration::days(offset)) else {
                break;
            };
            if !self.days.contains(&date.weekday()) {
                continue;
            }
            if let Some(opening) = self.opening_on(date) {
                if opening > at {
                    return opening;
                }
            }
        }
        tracing::warn!(at = %at, "no business window found within scan horizon, keeping original time");
        at
    }

    /// Start of the window on a local date, in UTC.
    fn opening_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(self.start_hour, 0, 0)?;
        let local = match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(earliest, _) => earliest,
            // Opening falls into a DST gap: the first valid instant is one hour later.
            LocalResult::None => self.tz.from_local_datetime(&(naive + Duration::hours(1))).earliest()?,
        };
        let opening = local.with_timezone(&Utc);
        self.is_open(opening).then_some(opening)
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            tz: Tz::UTC,
            start_hour: 9,
            end_hour: 18,
            days: vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
        }
    }
}
