pub mod availability;
pub mod booking;
pub mod clock;
pub mod notify;
pub mod slots;
pub mod time;
