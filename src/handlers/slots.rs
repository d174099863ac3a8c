use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{hhmm, DaySlots, DayStats, SlotRef};
use crate::services::availability;
use crate::services::time::TimeService;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DayResponse {
    #[serde(flatten)]
    day: DaySlots,
    day_name: String,
    is_today: bool,
    stats: DayStats,
}

fn day_response(time: &TimeService, day: DaySlots) -> DayResponse {
    DayResponse {
        day_name: time.day_name(day.date),
        is_today: time.is_today(day.date),
        stats: availability::day_stats(&day.slots),
        day,
    }
}

// GET /api/slots
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DayResponse>>, AppError> {
    let days = state.bookings.availability()?;
    let time = state.bookings.slots().time();

    Ok(Json(
        days.into_iter().map(|day| day_response(time, day)).collect(),
    ))
}

// GET /api/slots/weeks
pub async fn list_weeks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Vec<DayResponse>>>, AppError> {
    let days = state.bookings.availability()?;
    let time = state.bookings.slots().time();

    let weeks = availability::group_by_week(&days)
        .into_iter()
        .map(|week| week.into_iter().map(|day| day_response(time, day)).collect())
        .collect();

    Ok(Json(weeks))
}

// GET /api/slots/next
pub async fn next_slot(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<SlotRef>>, AppError> {
    let days = state.bookings.availability()?;
    Ok(Json(availability::next_available_slot(&days)))
}

#[derive(Serialize)]
pub struct SlotStatusResponse {
    date: NaiveDate,
    start_time: String,
    available: bool,
}

// GET /api/slots/:date/:time
pub async fn slot_status(
    State(state): State<Arc<AppState>>,
    Path((date, time)): Path<(NaiveDate, String)>,
) -> Result<Json<SlotStatusResponse>, AppError> {
    let start = hhmm::parse(&time)
        .ok_or_else(|| AppError::InvalidSlot(format!("invalid time (expected HH:MM): {time}")))?;

    let days = state.bookings.availability()?;
    Ok(Json(SlotStatusResponse {
        date,
        start_time: hhmm::format(&start),
        available: availability::is_slot_available(&days, date, start),
    }))
}
