use async_trait::async_trait;

use crate::models::Booking;
use crate::services::time::TimeService;

/// Post-commit delivery of a confirmed booking (email, calendar invite, ...).
/// Best effort: a failure here never undoes the booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking, subject: &str) -> anyhow::Result<()>;
}

/// e.g. `"Booking confirmed - 15 January at 09:00"`.
pub fn confirmation_subject(time: &TimeService, booking: &Booking) -> String {
    format!(
        "Booking confirmed - {}",
        time.format_for_display(booking.date, booking.start_time)
    )
}

/// Logs the confirmation instead of sending it.
pub struct LogNotifier {
    provider_name: String,
}

impl LogNotifier {
    pub fn new(provider_name: String) -> Self {
        Self { provider_name }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn booking_confirmed(&self, booking: &Booking, subject: &str) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            to = %booking.email,
            provider = %self.provider_name,
            subject,
            "booking confirmation (not delivered: log-only notifier)"
        );
        Ok(())
    }
}
