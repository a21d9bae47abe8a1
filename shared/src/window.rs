use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Local midnight of `now`'s day through 24h later minus one millisecond.
    pub fn today<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let start = start_of_local_day(&now.timezone(), now.date_naive());
        Self::new(start, start + Duration::hours(24) - Duration::milliseconds(1))
    }

    /// First day of `now`'s month at local midnight through `now`.
    pub fn month_to_date<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = now.date_naive();
        let first = today - Duration::days(i64::from(today.day0()));
        Self::new(
            start_of_local_day(&now.timezone(), first),
            now.with_timezone(&Utc),
        )
    }

    /// January 1st of `now`'s year at local midnight through `now`.
    pub fn year_to_date<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let today = now.date_naive();
        let first = today - Duration::days(i64::from(today.ordinal0()));
        Self::new(
            start_of_local_day(&now.timezone(), first),
            now.with_timezone(&Utc),
        )
    }
}

fn start_of_local_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    first_valid_instant(tz, date.and_time(NaiveTime::default()))
}

// Midnight can be skipped (DST gap) or repeated. A repeated midnight takes
// its earlier instant; a skipped one takes the transition that ends the gap.
fn first_valid_instant<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => instant.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => end_of_gap(tz, local),
    }
}

/// Earliest instant whose wall-clock reading is at or past `local`.
fn end_of_gap<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    // UTC offsets stay within a day, so `local` read as UTC +-1 day brackets it.
    let as_utc = Utc.from_utc_datetime(&local);
    let mut before = as_utc - Duration::days(1);
    let mut after = as_utc + Duration::days(1);
    while (after - before).num_seconds() > 1 {
        let middle = before + Duration::seconds((after - before).num_seconds() / 2);
        if middle.with_timezone(tz).naive_local() >= local {
            after = middle;
        } else {
            before = middle;
        }
    }
    after
}
