use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{Connection, ErrorCode};

use super::{BookingCommit, ParkingStore, SlotCountUpdate, StoreError, StoreErrorKind};
use crate::db::queries;
use crate::models::{Booking, NewBooking, ParkingLot};

/// Local store backed by the embedded SQLite database. Booking commits run
/// in a single transaction.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::new(StoreErrorKind::Unknown, "database lock poisoned"))
    }
}

fn tx_error(err: rusqlite::Error) -> StoreError {
    classify(anyhow::Error::from(err))
}

/// Refuses a booking whose slot is still held by another active booking.
fn ensure_slot_free(
    conn: &Connection,
    booking: &NewBooking,
    start: NaiveDateTime,
) -> Result<(), StoreError> {
    match queries::find_overlapping_booking(conn, booking, start).map_err(classify)? {
        Some(held) => Err(StoreError::conflict(format!(
            "slot {} is booked until {}",
            booking.slot_id,
            held.ends_at()
        ))),
        None => Ok(()),
    }
}

pub(crate) fn classify(err: anyhow::Error) -> StoreError {
    let message = format!("{err:#}");
    let kind = match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::QueryReturnedNoRows) => StoreErrorKind::NotFound,
        Some(rusqlite::Error::SqliteFailure(e, msg)) => match e.code {
            ErrorCode::ConstraintViolation => StoreErrorKind::Conflict,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreErrorKind::Transient,
            ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied => {
                StoreErrorKind::Unauthorized
            }
            _ if msg.as_deref().is_some_and(|m| m.contains("no such table")) => {
                StoreErrorKind::NotFound
            }
            _ => StoreErrorKind::Unknown,
        },
        _ => StoreErrorKind::Unknown,
    };
    StoreError::new(kind, message)
}

#[async_trait]
impl ParkingStore for SqliteStore {
    async fn list_lots(&self) -> Result<Vec<ParkingLot>, StoreError> {
        let conn = self.conn()?;
        queries::list_lots(&conn).map_err(classify)
    }

    async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let conn = self.conn()?;
        queries::get_bookings_for_user(&conn, user_id).map_err(classify)
    }

    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(tx_error)?;
        let now = Utc::now().naive_utc();

        ensure_slot_free(&tx, booking, now)?;
        let stored = queries::insert_booking(&tx, booking, now).map_err(classify)?;

        tx.commit().map_err(tx_error)?;
        Ok(stored)
    }

    async fn decrement_available_slots(
        &self,
        lot_id: &str,
    ) -> Result<SlotCountUpdate, StoreError> {
        let conn = self.conn()?;
        match queries::decrement_available_slots(&conn, lot_id).map_err(classify)? {
            Some(remaining) => Ok(SlotCountUpdate::Decremented { remaining }),
            None => match queries::get_lot(&conn, lot_id).map_err(classify)? {
                Some(_) => Ok(SlotCountUpdate::AlreadyEmpty),
                None => Err(StoreError::not_found(format!("parking lot {lot_id}"))),
            },
        }
    }

    fn commits_atomically(&self) -> bool {
        true
    }

    /// Insert and decrement commit together or not at all. A lot with no
    /// free slots, or a slot still held by a running booking, refuses it.
    async fn commit_booking(&self, booking: &NewBooking) -> Result<BookingCommit, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(tx_error)?;
        let now = Utc::now().naive_utc();

        if queries::get_lot(&tx, &booking.lot_id)
            .map_err(classify)?
            .is_none()
        {
            return Err(StoreError::not_found(format!(
                "parking lot {}",
                booking.lot_id
            )));
        }

        ensure_slot_free(&tx, booking, now)?;

        let remaining = queries::decrement_available_slots(&tx, &booking.lot_id)
            .map_err(classify)?
            .ok_or_else(|| {
                StoreError::conflict(format!("parking lot {} is full", booking.lot_id))
            })?;

        let stored = queries::insert_booking(&tx, booking, now).map_err(classify)?;

        tx.commit().map_err(tx_error)?;

        tracing::info!(
            booking_id = %stored.id,
            lot_id = %stored.lot_id,
            remaining,
            "booking committed"
        );

        Ok(BookingCommit {
            booking: stored,
            slots: SlotCountUpdate::Decremented { remaining },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn store_with_lot(available: u32) -> SqliteStore {
        let conn = db::init_db(":memory:").unwrap();
        db::seed_sample_lots(&conn).unwrap();
        let mut lot = queries::get_lot(&conn, "5").unwrap().unwrap();
        lot.available_slots = available;
        queries::upsert_lot(&conn, &lot).unwrap();
        SqliteStore::new(Arc::new(Mutex::new(conn)))
    }

    fn booking(id: &str, slot_id: &str) -> NewBooking {
        NewBooking {
            id: id.to_string(),
            user_id: None,
            lot_id: "5".to_string(),
            lot_name: "Riverside Parking".to_string(),
            slot_id: slot_id.to_string(),
            vehicle_number: "XYZ 9".to_string(),
            customer_name: "Bob".to_string(),
            duration_hours: 4,
            total_price: 12.0,
        }
    }

    async fn available(store: &SqliteStore) -> u32 {
        store
            .list_lots()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.id == "5")
            .unwrap()
            .available_slots
    }

    #[tokio::test]
    async fn test_commit_takes_last_slot_then_refuses() {
        let store = store_with_lot(1);

        let commit = store.commit_booking(&booking("b1", "5-slot-0")).await.unwrap();
        assert_eq!(commit.slots, SlotCountUpdate::Decremented { remaining: 0 });
        assert_eq!(available(&store).await, 0);

        let err = store
            .commit_booking(&booking("b2", "5-slot-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Conflict);
        assert_eq!(available(&store).await, 0);
    }

    #[tokio::test]
    async fn test_slot_rebooks_after_booking_ends() {
        let store = store_with_lot(10);
        store.commit_booking(&booking("b1", "5-slot-2")).await.unwrap();

        {
            let conn = store.conn().unwrap();
            conn.execute(
                "UPDATE bookings SET booking_time = '2000-01-01 00:00:00.000' WHERE id = 'b1'",
                [],
            )
            .unwrap();
        }

        let commit = store.commit_booking(&booking("b2", "5-slot-2")).await.unwrap();
        assert_eq!(commit.booking.slot_id, "5-slot-2");
        assert_eq!(available(&store).await, 8);

        let err = store.insert_booking(&booking("b3", "5-slot-2")).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_double_booked_slot_rolls_back_decrement() {
        let store = store_with_lot(10);
        store.commit_booking(&booking("b1", "5-slot-2")).await.unwrap();

        let err = store
            .commit_booking(&booking("b2", "5-slot-2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Conflict);
        assert_eq!(available(&store).await, 9);
    }

    #[tokio::test]
    async fn test_commit_unknown_lot_is_not_found() {
        let store = store_with_lot(10);
        let mut b = booking("b1", "x-slot-0");
        b.lot_id = "nope".to_string();
        let err = store.commit_booking(&b).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_decrement_reports_empty_lot() {
        let store = store_with_lot(0);
        assert_eq!(
            store.decrement_available_slots("5").await.unwrap(),
            SlotCountUpdate::AlreadyEmpty
        );
        let err = store.decrement_available_slots("nope").await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::NotFound);
    }

    #[test]
    fn test_missing_table_classified_as_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        let err = queries::list_lots(&conn).unwrap_err();
        assert_eq!(classify(err).kind, StoreErrorKind::NotFound);
    }
}
