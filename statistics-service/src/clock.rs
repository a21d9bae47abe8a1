use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Source of "now" for time-windowed reports. Read once per request.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// The current time on the wall clock of the zone the reports are kept in.
pub struct SystemClock {
    pub zone: Tz,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Tz>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}
