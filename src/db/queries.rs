use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingStatus, NewBooking, ParkingLot};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ── Parking Lots ──

pub fn count_lots(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM parking_lots", [], |row| row.get(0))?;
    Ok(count)
}

pub fn upsert_lot(conn: &Connection, lot: &ParkingLot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO parking_lots (id, name, address, lat, lng, total_slots, available_slots, price_per_hour, distance_info, rating, has_camera)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            address = excluded.address,
            lat = excluded.lat,
            lng = excluded.lng,
            total_slots = excluded.total_slots,
            available_slots = excluded.available_slots,
            price_per_hour = excluded.price_per_hour,
            distance_info = excluded.distance_info,
            rating = excluded.rating,
            has_camera = excluded.has_camera,
            updated_at = datetime('now')",
        params![
            lot.id,
            lot.name,
            lot.address,
            lot.lat,
            lot.lng,
            lot.total_slots,
            lot.available_slots,
            lot.price_per_hour,
            lot.distance,
            lot.rating,
            lot.has_camera,
        ],
    )?;
    Ok(())
}

pub fn list_lots(conn: &Connection) -> anyhow::Result<Vec<ParkingLot>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, address, lat, lng, total_slots, available_slots, price_per_hour, distance_info, rating, has_camera
         FROM parking_lots ORDER BY id",
    )?;
    let rows = stmt.query_map([], parse_lot_row)?;

    let mut lots = vec![];
    for row in rows {
        lots.push(row?);
    }
    Ok(lots)
}

pub fn get_lot(conn: &Connection, id: &str) -> anyhow::Result<Option<ParkingLot>> {
    let lot = conn
        .query_row(
            "SELECT id, name, address, lat, lng, total_slots, available_slots, price_per_hour, distance_info, rating, has_camera
             FROM parking_lots WHERE id = ?1",
            params![id],
            parse_lot_row,
        )
        .optional()?;
    Ok(lot)
}

/// Takes one slot if any is free. Returns the remaining count, or `None`
/// when the lot is missing or already empty.
pub fn decrement_available_slots(conn: &Connection, id: &str) -> anyhow::Result<Option<u32>> {
    let remaining = conn
        .query_row(
            "UPDATE parking_lots
             SET available_slots = available_slots - 1, updated_at = datetime('now')
             WHERE id = ?1 AND available_slots > 0
             RETURNING available_slots",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(remaining)
}

fn parse_lot_row(row: &rusqlite::Row) -> rusqlite::Result<ParkingLot> {
    Ok(ParkingLot {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        total_slots: row.get(5)?,
        available_slots: row.get(6)?,
        price_per_hour: row.get(7)?,
        distance: row.get(8)?,
        rating: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
        has_camera: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
    })
}

// ── Bookings ──

/// Stores an active booking that starts at `booked_at`.
pub fn insert_booking(
    conn: &Connection,
    booking: &NewBooking,
    booked_at: NaiveDateTime,
) -> anyhow::Result<Booking> {
    let stamp = booked_at.format(TIMESTAMP_FORMAT).to_string();

    conn.execute(
        "INSERT INTO bookings (id, user_id, parking_lot_id, parking_lot_name, slot_id, vehicle_number, customer_name, duration_hours, total_price, status, booking_time, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            booking.id,
            booking.user_id,
            booking.lot_id,
            booking.lot_name,
            booking.slot_id,
            booking.vehicle_number,
            booking.customer_name,
            booking.duration_hours,
            booking.total_price,
            BookingStatus::Active.as_str(),
            stamp,
        ],
    )?;

    Ok(Booking {
        id: booking.id.clone(),
        user_id: booking.user_id.clone(),
        lot_id: booking.lot_id.clone(),
        lot_name: booking.lot_name.clone(),
        slot_id: booking.slot_id.clone(),
        vehicle_number: booking.vehicle_number.clone(),
        customer_name: booking.customer_name.clone(),
        duration_hours: booking.duration_hours,
        total_price: booking.total_price,
        status: BookingStatus::Active,
        booking_time: booked_at,
        created_at: booked_at,
    })
}

pub fn get_bookings_for_user(conn: &Connection, user_id: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, parking_lot_id, parking_lot_name, slot_id, vehicle_number, customer_name, duration_hours, total_price, status, booking_time, created_at
         FROM bookings WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn active_bookings_for_slot(
    conn: &Connection,
    lot_id: &str,
    slot_id: &str,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, parking_lot_id, parking_lot_name, slot_id, vehicle_number, customer_name, duration_hours, total_price, status, booking_time, created_at
         FROM bookings WHERE parking_lot_id = ?1 AND slot_id = ?2 AND status = 'active'",
    )?;
    let rows = stmt.query_map(params![lot_id, slot_id], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// The active booking, if any, that holds `booking`'s slot during the
/// window it would occupy starting at `start`.
pub fn find_overlapping_booking(
    conn: &Connection,
    booking: &NewBooking,
    start: NaiveDateTime,
) -> anyhow::Result<Option<Booking>> {
    let (start, end) = booking.window_from(start);
    let held = active_bookings_for_slot(conn, &booking.lot_id, &booking.slot_id)?
        .into_iter()
        .find(|b| b.holds_slot_during(start, end));
    Ok(held)
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let status_str: String = row.get(9)?;
    let booking_time_str: String = row.get(10)?;
    let created_at_str: String = row.get(11)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        lot_id: row.get(2)?,
        lot_name: row.get(3)?,
        slot_id: row.get(4)?,
        vehicle_number: row.get(5)?,
        customer_name: row.get(6)?,
        duration_hours: row.get(7)?,
        total_price: row.get(8)?,
        status: BookingStatus::parse(&status_str),
        booking_time: parse_timestamp(&booking_time_str),
        created_at: parse_timestamp(&created_at_str),
    })
}

fn parse_timestamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .unwrap_or_else(|_| Utc::now().naive_utc())
}
