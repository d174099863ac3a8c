use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::AppError;
use crate::models::{hhmm, Booking, BookingStatus};

const BOOKING_COLUMNS: &str = "id, patient_name, email, phone, notes, date_iso, start_time, end_time, status, created_at, updated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_instant(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ── Bookings ──

/// Inserts `booking`; the partial unique index rejects a second active row
/// for the same slot, which surfaces as [`AppError::Conflict`].
pub fn create_booking(conn: &Connection, booking: &Booking) -> Result<(), AppError> {
    let result = conn.execute(
        "INSERT INTO bookings (id, patient_name, email, phone, notes, date_iso, start_time, end_time, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            booking.id,
            booking.patient_name,
            booking.email,
            booking.phone,
            booking.notes,
            format_date(&booking.date),
            hhmm::format(&booking.start_time),
            hhmm::format(&booking.end_time),
            booking.status.as_str(),
            format_instant(&booking.created_at),
            format_instant(&booking.updated_at),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(AppError::Conflict {
            date: booking.date,
            start_time: hhmm::format(&booking.start_time),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Active bookings at one slot, oldest first. More than one row means the
/// uniqueness constraint was bypassed at some point.
pub fn find_active_at(
    conn: &Connection,
    date: &NaiveDate,
    start: &NaiveTime,
) -> Result<Vec<Booking>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date_iso = ?1 AND start_time = ?2 AND status != 'cancelled'
         ORDER BY created_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(
        params![format_date(date), hhmm::format(start)],
        parse_booking_row,
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn get_bookings_for_date(conn: &Connection, date: &NaiveDate) -> Result<Vec<Booking>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE date_iso = ?1 ORDER BY start_time ASC, created_at ASC"
    ))?;

    let rows = stmt.query_map(params![format_date(date)], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn get_bookings_in_range(
    conn: &Connection,
    from: &NaiveDate,
    to: &NaiveDate,
) -> Result<Vec<Booking>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date_iso >= ?1 AND date_iso <= ?2
         ORDER BY date_iso ASC, start_time ASC, created_at ASC"
    ))?;

    let rows = stmt.query_map(params![format_date(from), format_date(to)], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> Result<Option<Booking>, AppError> {
    let booking = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
            params![id],
            parse_booking_row,
        )
        .optional()?;
    Ok(booking)
}

/// Returns false when no booking has `id`.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: BookingStatus,
    at: &DateTime<Utc>,
) -> Result<bool, AppError> {
    let result = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), format_instant(at), id],
    );

    match result {
        Ok(count) => Ok(count > 0),
        Err(e) if is_unique_violation(&e) => {
            let slot = get_booking_by_id(conn, id)?;
            match slot {
                Some(b) => Err(AppError::Conflict {
                    date: b.date,
                    start_time: hhmm::format(&b.start_time),
                }),
                None => Err(e.into()),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let date_str: String = row.get(5)?;
    let start_str: String = row.get(6)?;
    let end_str: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;

    let date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
        .map_err(|e| conversion_error(5, format!("bad date {date_str}: {e}")))?;
    let start_time = hhmm::parse(&start_str)
        .ok_or_else(|| conversion_error(6, format!("bad start time {start_str}")))?;
    let end_time = hhmm::parse(&end_str)
        .ok_or_else(|| conversion_error(7, format!("bad end time {end_str}")))?;
    let status = BookingStatus::parse(&status_str)
        .ok_or_else(|| conversion_error(8, format!("bad status {status_str}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| conversion_error(9, format!("bad created_at {created_at_str}: {e}")))?
        .with_timezone(&Utc);
    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map_err(|e| conversion_error(10, format!("bad updated_at {updated_at_str}: {e}")))?
        .with_timezone(&Utc);

    Ok(Booking {
        id: row.get(0)?,
        patient_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        notes: row.get(4)?,
        date,
        start_time,
        end_time,
        status,
        created_at,
        updated_at,
    })
}
