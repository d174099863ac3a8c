use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{hhmm, Booking, BookingStatus};

/// What any persistence backend for bookings must provide.
///
/// `create` owns the uniqueness invariant: it must atomically refuse a
/// booking whose slot already holds a non-cancelled booking, returning
/// [`AppError::Conflict`]. Callers never check-then-insert themselves.
pub trait BookingStore: Send + Sync {
    /// The active booking at a slot, if any.
    fn find_by_date_time(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<Option<Booking>, AppError>;

    fn create(&self, booking: &Booking) -> Result<(), AppError>;

    /// All bookings on `date`, any status, ordered by start time.
    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Booking>, AppError>;

    /// All bookings with `from <= date <= to`, any status.
    fn list_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>, AppError>;

    fn get_by_id(&self, id: &str) -> Result<Option<Booking>, AppError>;

    /// Sets `status` and `updated_at`. Moving a booking back out of
    /// `cancelled` is subject to the same uniqueness rule as `create`.
    fn update_status(
        &self,
        id: &str,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError>;
}

/// Picks the oldest of several active bookings at one slot and flags the
/// duplicate, which can only exist if the store was written around.
pub(crate) fn first_active(mut active: Vec<Booking>) -> Option<Booking> {
    if active.len() > 1 {
        tracing::warn!(
            date = %active[0].date,
            start_time = %hhmm::format(&active[0].start_time),
            count = active.len(),
            "multiple active bookings share one slot"
        );
    }
    if active.is_empty() {
        None
    } else {
        Some(active.swap_remove(0))
    }
}

pub struct SqliteBookingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBookingStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BookingStore for SqliteBookingStore {
    fn find_by_date_time(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<Option<Booking>, AppError> {
        let active = queries::find_active_at(&self.db(), &date, &start)?;
        Ok(first_active(active))
    }

    fn create(&self, booking: &Booking) -> Result<(), AppError> {
        queries::create_booking(&self.db(), booking)
    }

    fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Booking>, AppError> {
        queries::get_bookings_for_date(&self.db(), &date)
    }

    fn list_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Booking>, AppError> {
        queries::get_bookings_in_range(&self.db(), &from, &to)
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        queries::get_booking_by_id(&self.db(), id)
    }

    fn update_status(
        &self,
        id: &str,
        status: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, AppError> {
        let db = self.db();
        if !queries::update_booking_status(&db, id, status, &at)? {
            return Ok(None);
        }
        queries::get_booking_by_id(&db, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn store() -> SqliteBookingStore {
        SqliteBookingStore::new(db::init_db(":memory:").unwrap())
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn booking(id: &str, date: &str, start: &str) -> Booking {
        let created = at("2025-01-09T12:00:00.123456789Z");
        Booking {
            id: id.to_string(),
            patient_name: "Ana Souza".to_string(),
            email: "ana@example.com".to_string(),
            phone: Some("+5585999990000".to_string()),
            notes: None,
            date: d(date),
            start_time: t(start),
            end_time: t(start) + chrono::Duration::hours(1),
            status: BookingStatus::Confirmed,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_create_and_get_round_trip() {
        let store = store();
        let b = booking("b-1", "2025-01-10", "09:00");
        store.create(&b).unwrap();

        assert_eq!(store.get_by_id("b-1").unwrap(), Some(b));
        assert_eq!(store.get_by_id("missing").unwrap(), None);
    }

    #[test]
    fn test_second_active_booking_conflicts() {
        let store = store();
        store.create(&booking("b-1", "2025-01-10", "09:00")).unwrap();

        let err = store
            .create(&booking("b-2", "2025-01-10", "09:00"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
        assert_eq!(store.list_by_date(d("2025-01-10")).unwrap().len(), 1);
    }

    #[test]
    fn test_same_time_other_day_is_fine() {
        let store = store();
        store.create(&booking("b-1", "2025-01-10", "09:00")).unwrap();
        store.create(&booking("b-2", "2025-01-13", "09:00")).unwrap();
        store.create(&booking("b-3", "2025-01-10", "10:00")).unwrap();
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let store = store();
        store.create(&booking("b-1", "2025-01-10", "09:00")).unwrap();

        let cancelled = store
            .update_status("b-1", BookingStatus::Cancelled, at("2025-01-09T13:00:00Z"))
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.updated_at, at("2025-01-09T13:00:00Z"));
        assert_eq!(store.find_by_date_time(d("2025-01-10"), t("09:00")).unwrap(), None);

        store.create(&booking("b-2", "2025-01-10", "09:00")).unwrap();
        let active = store
            .find_by_date_time(d("2025-01-10"), t("09:00"))
            .unwrap()
            .unwrap();
        assert_eq!(active.id, "b-2");
    }

    #[test]
    fn test_reactivating_into_taken_slot_conflicts() {
        let store = store();
        store.create(&booking("b-1", "2025-01-10", "09:00")).unwrap();
        store
            .update_status("b-1", BookingStatus::Cancelled, at("2025-01-09T13:00:00Z"))
            .unwrap();
        store.create(&booking("b-2", "2025-01-10", "09:00")).unwrap();

        let err = store
            .update_status("b-1", BookingStatus::Confirmed, at("2025-01-09T14:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn test_update_status_unknown_id() {
        let store = store();
        let result = store
            .update_status("nope", BookingStatus::Cancelled, at("2025-01-09T13:00:00Z"))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_list_by_date_and_range() {
        let store = store();
        store.create(&booking("b-2", "2025-01-10", "11:00")).unwrap();
        store.create(&booking("b-1", "2025-01-10", "09:00")).unwrap();
        store.create(&booking("b-3", "2025-01-14", "09:00")).unwrap();
        store.create(&booking("b-4", "2025-02-20", "09:00")).unwrap();

        let friday = store.list_by_date(d("2025-01-10")).unwrap();
        let ids: Vec<_> = friday.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2"]);

        let range = store
            .list_in_range(d("2025-01-10"), d("2025-01-31"))
            .unwrap();
        assert_eq!(range.len(), 3);
        assert!(store.list_by_date(d("2025-01-11")).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_date_time_prefers_oldest_duplicate() {
        let conn = db::init_db(":memory:").unwrap();
        // Simulate a store written around the unique index.
        conn.execute_batch("DROP INDEX idx_bookings_active_slot;").unwrap();
        let store = SqliteBookingStore::new(conn);

        let mut newer = booking("b-new", "2025-01-10", "09:00");
        newer.created_at = at("2025-01-09T15:00:00Z");
        let mut older = booking("b-old", "2025-01-10", "09:00");
        older.created_at = at("2025-01-09T11:00:00Z");
        store.create(&newer).unwrap();
        store.create(&older).unwrap();

        let found = store
            .find_by_date_time(d("2025-01-10"), t("09:00"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "b-old");
    }
}
