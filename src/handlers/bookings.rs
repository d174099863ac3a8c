use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::errors::AppError;
use crate::models::{Booking, NewBooking};
use crate::services::notify::confirmation_subject;
use crate::state::AppState;

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.bookings.book(payload)?;

    // Delivery is best effort; the booking is already committed.
    let subject = confirmation_subject(state.bookings.slots().time(), &booking);
    if let Err(e) = state.notifier.booking_confirmed(&booking, &subject).await {
        tracing::warn!(booking_id = %booking.id, error = %e, "failed to send booking confirmation");
    }

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    state
        .bookings
        .get_by_id(&id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}
