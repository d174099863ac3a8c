use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::db::store::BookingStore;
use crate::errors::AppError;
use crate::models::{hhmm, Booking, BookingStatus};

type SlotKey = (NaiveDate, NaiveTime);

/// Non-durable backend. `active` maps each occupied slot to its booking id;
/// claiming a slot goes through the entry API so two writers for one key
/// serialize on the same shard lock.
pub struct MemoryBookingStore {
    bookings: DashMap<String, Booking>,
    active: DashMap<SlotKey, String>,
}

impl Default for MemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            active: DashMap::new(),
        }
    }

    fn conflict(key: &SlotKey) -> AppError {
        AppError::Conflict {
            date: key.0,
            start_time: hhmm::format(&key.1),
        }
    }

    fn sorted(mut bookings: Vec<Booking>) -> Vec<Booking> {
        bookings.sort_by(|a, b| {
            (a.date, a.start_time, a.created_at).cmp(&(b.date, b.start_time, b.created_at))
        });
        bookings
    }
}

impl BookingStore for MemoryBookingStore {
    fn find_by_date_time(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<Option<Booking>, AppError> {
        let Some(id) = self.active.get(&(date, start)).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.bookings.get(&id).map(|e| e.value().clone()))
    }

    fn create(&self, booking: &Booking) -> Result<(), AppError> {
        // Lock order is always `bookings` then `active`.
        let record = self.bookings.entry(booking.id.clone());
        if booking.is_active() {
            let key = (booking.date, booking.start_time);
            match self.active.entry(key) {
                Entry::Occupied(_) => return Err(Self::conflict(&key)),
                Entry::Vacant(slot) => {
                    slot.insert(booking.id.clone());
                }
            }
        }
        record.insert(booking.clone());
        Ok(())
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Booking>, AppError> {
        let found = self
            .bookings
            .iter()
            .filter(|e| e.value().date == date)
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(found))
    }

    fn list_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>, AppError> {
        let found = self
            .bookings
            .iter()
            .filter(|e| (from..=to).contains(&e.value().date))
            .map(|e| e.value().clone())
            .collect();
        Ok(Self::sorted(found))
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        Ok(self.bookings.get(id).map(|e| e.value().clone()))
    }

    fn update_status(
        &self,
        id: &str,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        // Held for the whole transition so status and slot index move together.
        let Some(mut record) = self.bookings.get_mut(id) else {
            return Ok(None);
        };
        let key = (record.date, record.start_time);
        let activating = !record.is_active() && status != BookingStatus::Cancelled;

        if activating {
            match self.active.entry(key) {
                Entry::Occupied(_) => return Err(Self::conflict(&key)),
                Entry::Vacant(slot) => {
                    slot.insert(id.to_string());
                }
            }
        } else if status == BookingStatus::Cancelled {
            self.active.remove_if(&key, |_, holder| holder == id);
        }

        record.status = status;
        record.updated_at = at;
        Ok(Some(record.value().clone()))
    }
}
