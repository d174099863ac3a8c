//! Merges generated slots with persisted bookings.
//!
//! Everything here is a pure function over its inputs; results are display
//! hints only and carry no reservation.

use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::{Booking, DaySlots, DayStats, SlotRef, TimeSlot};

/// Marks every slot held by an active booking as unavailable.
pub fn mark_occupied(days: &[DaySlots], bookings: &[Booking]) -> Vec<DaySlots> {
    days.iter()
        .map(|day| {
            let active: Vec<&Booking> = bookings
                .iter()
                .filter(|b| b.date == day.date && b.is_active())
                .collect();

            let slots = day
                .slots
                .iter()
                .map(|slot| TimeSlot {
                    available: slot.available
                        && !active.iter().any(|b| b.start_time == slot.start_time),
                    ..slot.clone()
                })
                .collect();

            DaySlots {
                date: day.date,
                slots,
            }
        })
        .collect()
}

pub fn slots_for_date(days: &[DaySlots], date: NaiveDate) -> &[TimeSlot] {
    days.iter()
        .find(|d| d.date == date)
        .map(|d| d.slots.as_slice())
        .unwrap_or_default()
}

/// False when the day or slot is unknown.
pub fn is_slot_available(days: &[DaySlots], date: NaiveDate, start: NaiveTime) -> bool {
    slots_for_date(days, date)
        .iter()
        .find(|s| s.start_time == start)
        .is_some_and(|s| s.available)
}

pub fn next_available_slot(days: &[DaySlots]) -> Option<SlotRef> {
    days.iter().find_map(|day| {
        day.slots.iter().find(|s| s.available).map(|s| SlotRef {
            date: day.date,
            start_time: s.start_time,
        })
    })
}

pub fn day_stats(slots: &[TimeSlot]) -> DayStats {
    let total = slots.len();
    let available = slots.iter().filter(|s| s.available).count();
    DayStats {
        total,
        available,
        occupied: total - available,
    }
}

/// Groups date-ordered days into Monday-to-Sunday weeks. Closed days may be
/// absent, so a week ends wherever the next day falls in a later ISO week.
pub fn group_by_week(days: &[DaySlots]) -> Vec<Vec<DaySlots>> {
    let mut weeks = Vec::new();
    let mut current: Vec<DaySlots> = Vec::new();

    for day in days {
        if current
            .first()
            .is_some_and(|first| first.date.iso_week() != day.date.iso_week())
        {
            weeks.push(std::mem::take(&mut current));
        }
        current.push(day.clone());
    }
    if !current.is_empty() {
        weeks.push(current);
    }
    weeks
}
