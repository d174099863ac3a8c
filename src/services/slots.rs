use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::{DaySlots, Schedule, TimeSlot};
use crate::services::time::TimeService;

/// Expands weekday rules into concrete slots. Holds no mutable state: the
/// same schedule and clock always produce the same slots.
pub struct SlotGenerator {
    schedule: Schedule,
    time: Arc<TimeService>,
}

impl SlotGenerator {
    pub fn new(schedule: Schedule, time: Arc<TimeService>) -> Self {
        Self { schedule, time }
    }

    pub fn time(&self) -> &TimeService {
        &self.time
    }

    /// Slots for one date, flagged unavailable when already started.
    /// Empty when no rule covers the date's weekday.
    pub fn generate_day_slots(&self, date: NaiveDate) -> Vec<TimeSlot> {
        let Some(rule) = self.schedule.rule_for(date.weekday()) else {
            return Vec::new();
        };

        let step = self.schedule.session.step_minutes();
        if step == 0 {
            return Vec::new();
        }
        let end = rule.end_minutes();

        let mut slots = Vec::new();
        let mut current = rule.start_minutes();
        while let Some(next) = current.checked_add(step).filter(|next| *next <= end) {
            if let Some(start_time) = NaiveTime::from_hms_opt(current / 60, current % 60, 0) {
                slots.push(TimeSlot {
                    start_time,
                    end_time: self.time.end_time(start_time),
                    available: !self.time.is_past(date, start_time),
                });
            }
            current = next;
        }
        slots
    }

    /// Every date in the bookable window that has at least one slot.
    pub fn generate_all_day_slots(&self) -> Vec<DaySlots> {
        self.time
            .date_range(self.schedule.session.weeks_forward)
            .into_iter()
            .filter_map(|date| {
                let slots = self.generate_day_slots(date);
                (!slots.is_empty()).then_some(DaySlots { date, slots })
            })
            .collect()
    }

    /// Whether `start` on `date` is a slot the schedule offers inside the window.
    pub fn offers(&self, date: NaiveDate, start: NaiveTime) -> bool {
        self.window_contains(date)
            && self
                .generate_day_slots(date)
                .iter()
                .any(|s| s.start_time == start)
    }

    pub fn window_contains(&self, date: NaiveDate) -> bool {
        let range = self.time.date_range(self.schedule.session.weeks_forward);
        matches!((range.first(), range.last()), (Some(first), Some(last)) if *first <= date && date <= *last)
    }

    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        let range = self.time.date_range(self.schedule.session.weeks_forward);
        Some((*range.first()?, *range.last()?))
    }
}
