pub mod availability;
pub mod booking;
pub mod hhmm;

pub use availability::{DaySlots, DayStats, Schedule, SessionConfig, SlotRef, TimeSlot, WeekdayRule};
pub use booking::{Booking, BookingStatus, NewBooking};
