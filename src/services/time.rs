//! Civil-time arithmetic for the provider's configured timezone.
//!
//! Every calendar date and wall-clock time in the engine is read in the
//! provider's zone, never in the host's. "Now" always comes from the
//! injected [`Clock`].

use std::sync::Arc;

use chrono::{
    DateTime, Days, Duration, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::models::SessionConfig;
use crate::services::clock::Clock;

pub struct TimeService {
    timezone: Tz,
    step_minutes: u32,
    clock: Arc<dyn Clock>,
}

impl TimeService {
    pub fn new(session: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            timezone: session.timezone,
            step_minutes: session.step_minutes(),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.timezone)
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// `start + session + buffer` on a 24h clock.
    pub fn end_time(&self, start: NaiveTime) -> NaiveTime {
        let (end, _) = start.overflowing_add_signed(Duration::minutes(i64::from(self.step_minutes)));
        end
    }

    /// The UTC instant of a wall-clock time on a civil date in the configured zone.
    pub fn to_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            // Skipped by a forward DST jump: read it with the offset in force before the gap.
            LocalResult::None => {
                let before = local - Duration::hours(24);
                let offset = self.timezone.offset_from_local_datetime(&before).earliest();
                let seconds = offset
                    .map(|o| i64::from(o.fix().local_minus_utc()))
                    .unwrap_or_default();
                Utc.from_utc_datetime(&(local - Duration::seconds(seconds)))
            }
        }
    }

    pub fn is_past(&self, date: NaiveDate, start: NaiveTime) -> bool {
        self.to_instant(date, start) < self.clock.now()
    }

    /// Every date from civil today through `today + weeks_forward * 7` days, inclusive.
    pub fn date_range(&self, weeks_forward: u32) -> Vec<NaiveDate> {
        let today = self.today();
        let days = u64::from(weeks_forward) * 7;
        (0..=days)
            .filter_map(|offset| today.checked_add_days(Days::new(offset)))
            .collect()
    }

    pub fn is_today(&self, date: NaiveDate) -> bool {
        self.today() == date
    }

    pub fn day_name(&self, date: NaiveDate) -> String {
        date.format("%A").to_string()
    }

    /// e.g. `"15 January at 09:00"`.
    pub fn format_for_display(&self, date: NaiveDate, time: NaiveTime) -> String {
        format!("{} at {}", date.format("%d %B"), time.format("%H:%M"))
    }
}
