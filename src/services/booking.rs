use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::db::BookingStore;
use crate::errors::AppError;
use crate::models::{hhmm, Booking, BookingStatus, DaySlots, NewBooking};
use crate::services::availability::mark_occupied;
use crate::services::slots::SlotGenerator;

pub struct BookingService {
    store: Arc<dyn BookingStore>,
    slots: Arc<SlotGenerator>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>, slots: Arc<SlotGenerator>) -> Self {
        Self { store, slots }
    }

    pub fn slots(&self) -> &SlotGenerator {
        &self.slots
    }

    /// Books one slot. The store's atomic create is the only occupancy
    /// check; a taken slot comes back as [`AppError::Conflict`] and is
    /// never retried here.
    pub fn book(&self, payload: NewBooking) -> Result<Booking, AppError> {
        let payload = payload.normalized();
        let time = self.slots.time();

        if !self.slots.offers(payload.date, payload.start_time) {
            return Err(AppError::InvalidSlot(format!(
                "{} {} is not an offered slot",
                payload.date,
                hhmm::format(&payload.start_time)
            )));
        }
        if time.is_past(payload.date, payload.start_time) {
            return Err(AppError::InvalidSlot(format!(
                "{} {} has already started",
                payload.date,
                hhmm::format(&payload.start_time)
            )));
        }

        let now = time.now().with_timezone(&Utc);
        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            patient_name: payload.patient_name,
            email: payload.email,
            phone: payload.phone,
            notes: payload.notes,
            date: payload.date,
            start_time: payload.start_time,
            end_time: time.end_time(payload.start_time),
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        };

        match self.store.create(&booking) {
            Ok(()) => {
                tracing::info!(
                    booking_id = %booking.id,
                    date = %booking.date,
                    start_time = %hhmm::format(&booking.start_time),
                    "booking confirmed"
                );
                Ok(booking)
            }
            Err(e @ AppError::Conflict { .. }) => {
                tracing::warn!(
                    date = %booking.date,
                    start_time = %hhmm::format(&booking.start_time),
                    "slot already taken"
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Bookable slots for the whole window, with past and occupied slots
    /// flagged. Advisory only: `book` re-validates at write time.
    pub fn availability(&self) -> Result<Vec<DaySlots>, AppError> {
        let days = self.slots.generate_all_day_slots();
        let Some((from, to)) = self.slots.window() else {
            return Ok(days);
        };
        let bookings = self.store.list_in_range(from, to)?;
        Ok(mark_occupied(&days, &bookings))
    }

    pub fn get_by_id(&self, id: &str) -> Result<Option<Booking>, AppError> {
        self.store.get_by_id(id)
    }

    pub fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Booking>, AppError> {
        self.store.list_by_date(date)
    }

    /// Cancelling twice is a no-op that returns the booking unchanged.
    pub fn cancel(&self, id: &str) -> Result<Booking, AppError> {
        let booking = self
            .store
            .get_by_id(id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        let now = self.slots.time().now().with_timezone(&Utc);
        let cancelled = self
            .store
            .update_status(id, BookingStatus::Cancelled, now)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;

        tracing::info!(booking_id = %id, "booking cancelled");
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use chrono::{DateTime, NaiveTime};

    use super::*;
    use crate::db::{self, MemoryBookingStore, SqliteBookingStore};
    use crate::models::Schedule;
    use crate::services::availability::{is_slot_available, next_available_slot};
    use crate::services::clock::FixedClock;
    use crate::services::time::TimeService;

    // 08:00 on Friday 2025-01-10 in Fortaleza (UTC-3).
    const NOW: &str = "2025-01-10T11:00:00Z";

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn service_with(store: Arc<dyn BookingStore>, now: &str) -> BookingService {
        let schedule = Schedule::default();
        let time = Arc::new(TimeService::new(
            &schedule.session,
            Arc::new(FixedClock::at(utc(now))),
        ));
        BookingService::new(store, Arc::new(SlotGenerator::new(schedule, time)))
    }

    fn sqlite_service() -> BookingService {
        let store = SqliteBookingStore::new(db::init_db(":memory:").unwrap());
        service_with(Arc::new(store), NOW)
    }

    fn payload(date: &str, start: &str) -> NewBooking {
        NewBooking {
            patient_name: " Ana Souza ".to_string(),
            email: "Ana@Example.com".to_string(),
            phone: Some("+55 85 99999-0000".to_string()),
            notes: None,
            date: d(date),
            start_time: t(start),
            end_time: None,
        }
    }

    #[test]
    fn test_book_assigns_server_fields() {
        let service = sqlite_service();
        let booking = service.book(payload("2025-01-10", "09:00")).unwrap();

        assert!(!booking.id.is_empty());
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.end_time, t("10:00"));
        assert_eq!(booking.patient_name, "Ana Souza");
        assert_eq!(booking.email, "ana@example.com");
        assert_eq!(booking.created_at, utc(NOW));
        assert_eq!(booking.updated_at, utc(NOW));
    }

    #[test]
    fn test_client_end_time_is_ignored() {
        let service = sqlite_service();
        let mut request = payload("2025-01-10", "11:00");
        request.end_time = Some(t("15:00"));
        let booking = service.book(request).unwrap();
        assert_eq!(booking.end_time, t("12:00"));
    }

    #[test]
    fn test_round_trip_through_get_by_id() {
        let service = sqlite_service();
        let booking = service.book(payload("2025-01-13", "14:00")).unwrap();
        assert_eq!(service.get_by_id(&booking.id).unwrap(), Some(booking));
        assert_eq!(service.get_by_id("missing").unwrap(), None);
    }

    #[test]
    fn test_second_booking_for_slot_conflicts() {
        let service = sqlite_service();
        service.book(payload("2025-01-10", "09:00")).unwrap();
        let err = service.book(payload("2025-01-10", "09:00")).unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[test]
    fn test_cancelled_booking_frees_slot() {
        let service = sqlite_service();
        let first = service.book(payload("2025-01-10", "09:00")).unwrap();

        let cancelled = service.cancel(&first.id).unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let again = service.book(payload("2025-01-10", "09:00")).unwrap();
        assert_ne!(again.id, first.id);
        assert_eq!(service.list_by_date(d("2025-01-10")).unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_is_idempotent_and_unknown_is_not_found() {
        let service = sqlite_service();
        let booking = service.book(payload("2025-01-10", "09:00")).unwrap();
        let first = service.cancel(&booking.id).unwrap();
        let second = service.cancel(&booking.id).unwrap();
        assert_eq!(first, second);

        assert!(matches!(service.cancel("nope"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_rejects_slots_not_offered() {
        let service = sqlite_service();
        // Off-grid time, closed weekday, outside the window, before today.
        for (date, start) in [
            ("2025-01-10", "09:30"),
            ("2025-01-11", "09:00"),
            ("2025-03-10", "09:00"),
            ("2025-01-09", "09:00"),
        ] {
            let err = service.book(payload(date, start)).unwrap_err();
            assert!(matches!(err, AppError::InvalidSlot(_)), "{date} {start}");
        }
    }

    #[test]
    fn test_rejects_started_slot() {
        // 09:30 in Fortaleza: the 09:00 slot has begun.
        let store = SqliteBookingStore::new(db::init_db(":memory:").unwrap());
        let service = service_with(Arc::new(store), "2025-01-10T12:30:00Z");
        let err = service.book(payload("2025-01-10", "09:00")).unwrap_err();
        assert!(matches!(err, AppError::InvalidSlot(_)));
        service.book(payload("2025-01-10", "10:00")).unwrap();
    }

    #[test]
    fn test_availability_reflects_bookings() {
        let service = sqlite_service();
        let before = service.availability().unwrap();
        assert!(is_slot_available(&before, d("2025-01-10"), t("09:00")));

        service.book(payload("2025-01-10", "09:00")).unwrap();
        let after = service.availability().unwrap();
        assert!(!is_slot_available(&after, d("2025-01-10"), t("09:00")));
        assert!(is_slot_available(&after, d("2025-01-10"), t("10:00")));
        assert_eq!(
            next_available_slot(&after).map(|s| s.start_time),
            Some(t("10:00"))
        );
    }

    fn race_for_one_slot(store: Arc<dyn BookingStore>) {
        let service = Arc::new(service_with(store, NOW));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.book(payload("2025-01-10", "15:00"))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let won = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict { .. })))
            .count();

        assert_eq!(won, 1);
        assert_eq!(conflicts, 7);
        let active: Vec<_> = service
            .list_by_date(d("2025-01-10"))
            .unwrap()
            .into_iter()
            .filter(|b| b.is_active())
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_concurrent_books_sqlite_one_winner() {
        let store = SqliteBookingStore::new(db::init_db(":memory:").unwrap());
        race_for_one_slot(Arc::new(store));
    }

    #[test]
    fn test_concurrent_books_memory_one_winner() {
        race_for_one_slot(Arc::new(MemoryBookingStore::new()));
    }
}
