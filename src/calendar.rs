use anyhow::{anyhow, Result};
use jiff::civil::Date;
use jiff::tz::{Offset, TimeZone};
use jiff::{Span, Timestamp, Zoned};
use serde::{Deserialize, Serialize};

// Seconds east of UTC for the program's reporting zone (+05:30). All
// civil-date math happens in this one frame; the host zone is never read.
const IST_OFFSET_SECONDS: i32 = 5 * 3600 + 30 * 60;

/// Fixed-offset civil calendar.
///
/// Every comparison in the engine is made on the wall-clock date an instant
/// falls on under this offset, so a visit stored at 23:50 and a query made
/// minutes later on the other side of a UTC day boundary still land on the
/// same calendar day.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Calendar {
    offset: Offset,
}

impl Calendar {
    /// Indian Standard Time, +05:30. The zone the health program reports in.
    pub fn ist() -> Self {
        Self {
            offset: Offset::from_seconds(IST_OFFSET_SECONDS).expect("+05:30 is a valid offset"),
        }
    }

    pub fn new(offset: Offset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn time_zone(&self) -> TimeZone {
        TimeZone::fixed(self.offset)
    }

    /// The wall-clock date `instant` falls on, time-of-day discarded.
    pub fn civil_date(&self, instant: &Zoned) -> Date {
        self.offset.to_datetime(instant.timestamp()).date()
    }

    /// Today's wall-clock date.
    pub fn today(&self) -> Date {
        self.offset.to_datetime(Timestamp::now()).date()
    }

    /// "03 Jan 2025"
    pub fn display_date(&self, instant: &Zoned) -> String {
        self.civil_date(instant).strftime("%d %b %Y").to_string()
    }

    /// "2025-01-03"
    pub fn iso_date(&self, instant: &Zoned) -> String {
        self.civil_date(instant).to_string()
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::ist()
    }
}

/// Calendar-day arithmetic; `n` may be negative. Saturates at the civil
/// date range rather than failing, keeping callers total over degenerate
/// inputs.
pub fn add_days(date: Date, n: i64) -> Date {
    date.saturating_add(Span::new().days(n))
}

/// Parse a `YYYY-MM-DD` query parameter into a civil date.
pub fn parse_date(s: &str) -> Result<Date> {
    s.parse::<Date>()
        .map_err(|e| anyhow!("invalid date {s:?}, expected YYYY-MM-DD: {e}"))
}

/// One calendar month in the reporting zone, inclusive on both ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct MonthWindow {
    start: Date,
    end: Date,
}

impl MonthWindow {
    pub fn containing(date: Date) -> Self {
        Self {
            start: date.first_of_month(),
            end: date.last_of_month(),
        }
    }

    pub fn start(&self) -> Date {
        self.start
    }

    pub fn end(&self) -> Date {
        self.end
    }

    /// "2025-06"
    pub fn label(&self) -> String {
        self.start.strftime("%Y-%m").to_string()
    }
}

/// The `count` calendar months ending with the month containing `today`,
/// oldest first.
pub fn trailing_months(today: Date, count: u32) -> Vec<MonthWindow> {
    let current = today.first_of_month();
    (0..count)
        .rev()
        .map(|back| {
            MonthWindow::containing(current.saturating_sub(Span::new().months(i64::from(back))))
        })
        .collect()
}
