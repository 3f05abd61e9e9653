use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::models::{is_offered_duration, Booking, NewBooking, ParkingLot, Session, sample_lots};
use crate::services::notices::NoticeBus;
use crate::store::{BookingCommit, ParkingStore, SlotCountUpdate, StoreError, StoreErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LotSource {
    Store,
    /// Bundled sample lots served because the store could not be read.
    Sample,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotListing {
    pub lots: Vec<ParkingLot>,
    pub source: LotSource,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("a {0} hour booking is not offered")]
    InvalidDuration(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Boundary between the booking core and whichever store is configured.
/// Reads degrade to sample data instead of failing; every call is bounded
/// by `timeout`.
#[derive(Clone)]
pub struct SyncAdapter {
    store: Arc<dyn ParkingStore>,
    notices: NoticeBus,
    timeout: Duration,
}

impl SyncAdapter {
    pub fn new(store: Arc<dyn ParkingStore>, notices: NoticeBus, timeout: Duration) -> Self {
        Self {
            store,
            notices,
            timeout,
        }
    }

    pub fn notices(&self) -> &NoticeBus {
        &self.notices
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::transient(format!(
                "store did not answer within {:?}",
                self.timeout
            ))),
        }
    }

    /// All lots, or the sample list when the store read fails. Each failed
    /// read publishes exactly one notice.
    pub async fn list_lots(&self) -> LotListing {
        match self.bounded(self.store.list_lots()).await {
            Ok(lots) => LotListing {
                lots,
                source: LotSource::Store,
            },
            Err(e) => {
                if e.kind == StoreErrorKind::NotFound {
                    tracing::warn!(error = %e, "parking lots table missing, serving sample data");
                    self.notices.warning(format!(
                        "Parking lots are not set up yet ({}). Showing sample locations.",
                        e.message
                    ));
                } else {
                    tracing::error!(error = %e, kind = %e.kind, "failed to fetch parking lots");
                    self.notices
                        .error(format!("Fetch failed: {}. Using sample data.", e.message));
                }
                LotListing {
                    lots: sample_lots(),
                    source: LotSource::Sample,
                }
            }
        }
    }

    pub async fn find_lot(&self, lot_id: &str) -> Option<ParkingLot> {
        self.list_lots()
            .await
            .lots
            .into_iter()
            .find(|lot| lot.id == lot_id)
    }

    /// The session user's bookings, newest first. Anonymous callers and
    /// store failures both get an empty list.
    pub async fn list_bookings(&self, session: Option<&Session>) -> Vec<Booking> {
        let Some(session) = session else {
            return Vec::new();
        };

        match self.bounded(self.store.list_bookings(&session.user_id)).await {
            Ok(bookings) => bookings,
            Err(e) => {
                tracing::error!(error = %e, user_id = %session.user_id, "failed to fetch bookings");
                Vec::new()
            }
        }
    }

    /// Writes a booking and takes a slot from its lot.
    ///
    /// A failed or timed out insert is returned as an error. A booking whose
    /// counter update failed or timed out still counts as booked; the
    /// divergence is logged and announced. Stores without an atomic commit
    /// get each write bounded on its own so a slow decrement cannot turn a
    /// stored booking into an error.
    pub async fn commit_booking(&self, booking: &NewBooking) -> Result<BookingCommit, WriteError> {
        if !is_offered_duration(booking.duration_hours) {
            return Err(WriteError::InvalidDuration(booking.duration_hours));
        }

        let commit = if self.store.commits_atomically() {
            self.bounded(self.store.commit_booking(booking)).await?
        } else {
            let stored = self.bounded(self.store.insert_booking(booking)).await?;
            let slots = match self
                .bounded(self.store.decrement_available_slots(&stored.lot_id))
                .await
            {
                Ok(update) => update,
                Err(e) => SlotCountUpdate::Failed {
                    reason: e.to_string(),
                },
            };
            BookingCommit {
                booking: stored,
                slots,
            }
        };

        match &commit.slots {
            SlotCountUpdate::Decremented { remaining } => {
                tracing::info!(
                    booking_id = %commit.booking.id,
                    lot_id = %commit.booking.lot_id,
                    remaining,
                    "booking stored"
                );
            }
            SlotCountUpdate::AlreadyEmpty => {
                tracing::warn!(
                    booking_id = %commit.booking.id,
                    lot_id = %commit.booking.lot_id,
                    "booking stored for a lot already at zero available slots"
                );
            }
            SlotCountUpdate::Failed { reason } => {
                tracing::error!(
                    booking_id = %commit.booking.id,
                    lot_id = %commit.booking.lot_id,
                    reason = %reason,
                    "booking stored but available_slots was not updated"
                );
                self.notices.warning(format!(
                    "Booking saved, but availability for {} may be out of date.",
                    commit.booking.lot_name
                ));
            }
        }

        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::models::{BookingStatus, NoticeLevel};

    #[derive(Default)]
    struct FakeStore {
        lots_error: Option<StoreError>,
        bookings_error: Option<StoreError>,
        fail_decrement: AtomicBool,
        hang: bool,
        slow_insert: bool,
        slow_decrement: bool,
        available: AtomicU32,
        inserted: Mutex<Vec<NewBooking>>,
    }

    #[async_trait]
    impl ParkingStore for FakeStore {
        async fn list_lots(&self) -> Result<Vec<ParkingLot>, StoreError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            match &self.lots_error {
                Some(e) => Err(e.clone()),
                None => Ok(vec![sample_lots().remove(0)]),
            }
        }

        async fn list_bookings(&self, _user_id: &str) -> Result<Vec<Booking>, StoreError> {
            match &self.bookings_error {
                Some(e) => Err(e.clone()),
                None => Ok(self
                    .inserted
                    .lock()
                    .unwrap()
                    .iter()
                    .map(stored)
                    .collect()),
            }
        }

        async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, StoreError> {
            if self.slow_insert {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.inserted.lock().unwrap().push(booking.clone());
            Ok(stored(booking))
        }

        async fn decrement_available_slots(
            &self,
            _lot_id: &str,
        ) -> Result<SlotCountUpdate, StoreError> {
            if self.slow_decrement {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail_decrement.load(Ordering::SeqCst) {
                return Err(StoreError::transient("connection reset"));
            }
            let remaining = self.available.load(Ordering::SeqCst).saturating_sub(1);
            self.available.store(remaining, Ordering::SeqCst);
            Ok(SlotCountUpdate::Decremented { remaining })
        }
    }

    fn stored(b: &NewBooking) -> Booking {
        let now = chrono::Utc::now().naive_utc();
        Booking {
            id: b.id.clone(),
            user_id: b.user_id.clone(),
            lot_id: b.lot_id.clone(),
            lot_name: b.lot_name.clone(),
            slot_id: b.slot_id.clone(),
            vehicle_number: b.vehicle_number.clone(),
            customer_name: b.customer_name.clone(),
            duration_hours: b.duration_hours,
            total_price: b.total_price,
            status: BookingStatus::Active,
            booking_time: now,
            created_at: now,
        }
    }

    fn adapter(store: FakeStore) -> (SyncAdapter, NoticeBus) {
        let notices = NoticeBus::default();
        let adapter = SyncAdapter::new(Arc::new(store), notices.clone(), Duration::from_millis(200));
        (adapter, notices)
    }

    fn new_booking(hours: u32) -> NewBooking {
        NewBooking {
            id: "b1".to_string(),
            user_id: Some("u1".to_string()),
            lot_id: "1".to_string(),
            lot_name: "City Center Parking".to_string(),
            slot_id: "1-slot-0".to_string(),
            vehicle_number: "ABC".to_string(),
            customer_name: "Alice".to_string(),
            duration_hours: hours,
            total_price: 5.0 * hours as f64,
        }
    }

    #[tokio::test]
    async fn test_lots_from_store() {
        let (adapter, notices) = adapter(FakeStore::default());
        let mut rx = notices.subscribe();

        let listing = adapter.list_lots().await;
        assert_eq!(listing.source, LotSource::Store);
        assert_eq!(listing.lots.len(), 1);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_missing_relation_falls_back_with_one_warning() {
        let (adapter, notices) = adapter(FakeStore {
            lots_error: Some(StoreError::not_found("relation \"parking_lots\" does not exist")),
            ..Default::default()
        });
        let mut rx = notices.subscribe();

        let listing = adapter.list_lots().await;
        assert_eq!(listing.source, LotSource::Sample);
        assert_eq!(listing.lots, sample_lots());

        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Warning);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        adapter.list_lots().await;
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Warning);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_other_errors_fall_back_with_error_notice() {
        let (adapter, notices) = adapter(FakeStore {
            lots_error: Some(StoreError::new(StoreErrorKind::Unauthorized, "bad key")),
            ..Default::default()
        });
        let mut rx = notices.subscribe();

        let listing = adapter.list_lots().await;
        assert_eq!(listing.lots.len(), 5);
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.contains("bad key"));
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let (adapter, _) = adapter(FakeStore {
            hang: true,
            ..Default::default()
        });
        let listing = adapter.list_lots().await;
        assert_eq!(listing.source, LotSource::Sample);
    }

    #[tokio::test]
    async fn test_bookings_need_a_session() {
        let (adapter, _) = adapter(FakeStore::default());
        adapter.commit_booking(&new_booking(2)).await.unwrap();

        assert!(adapter.list_bookings(None).await.is_empty());
        let session = Session::new("u1");
        assert_eq!(adapter.list_bookings(Some(&session)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_booking_read_errors_become_empty() {
        let (adapter, _) = adapter(FakeStore {
            bookings_error: Some(StoreError::transient("down")),
            ..Default::default()
        });
        let session = Session::new("u1");
        assert!(adapter.list_bookings(Some(&session)).await.is_empty());
    }

    #[tokio::test]
    async fn test_duration_outside_menu_is_rejected() {
        let (adapter, _) = adapter(FakeStore::default());
        let err = adapter.commit_booking(&new_booking(3)).await.unwrap_err();
        assert!(matches!(err, WriteError::InvalidDuration(3)));
    }

    #[tokio::test]
    async fn test_partial_write_is_reported() {
        let store = FakeStore::default();
        store.fail_decrement.store(true, Ordering::SeqCst);
        let (adapter, notices) = adapter(store);
        let mut rx = notices.subscribe();

        let commit = adapter.commit_booking(&new_booking(1)).await.unwrap();
        assert!(matches!(commit.slots, SlotCountUpdate::Failed { .. }));
        assert_eq!(commit.booking.id, "b1");
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_decrement_after_insert() {
        let store = FakeStore::default();
        store.available.store(1, Ordering::SeqCst);
        let (adapter, _) = adapter(store);

        let commit = adapter.commit_booking(&new_booking(8)).await.unwrap();
        assert_eq!(commit.slots, SlotCountUpdate::Decremented { remaining: 0 });
    }

    #[tokio::test]
    async fn test_slow_decrement_keeps_the_stored_booking() {
        let store = Arc::new(FakeStore {
            slow_decrement: true,
            ..Default::default()
        });
        let notices = NoticeBus::default();
        let mut rx = notices.subscribe();
        let adapter = SyncAdapter::new(store.clone(), notices, Duration::from_millis(100));

        let commit = adapter.commit_booking(&new_booking(2)).await.unwrap();
        assert_eq!(commit.booking.id, "b1");
        match commit.slots {
            SlotCountUpdate::Failed { reason } => assert!(reason.contains("did not answer")),
            other => panic!("unexpected slot update: {other:?}"),
        }
        assert_eq!(store.inserted.lock().unwrap().len(), 1);
        assert_eq!(rx.try_recv().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_slow_insert_is_an_error() {
        let store = Arc::new(FakeStore {
            slow_insert: true,
            ..Default::default()
        });
        let adapter = SyncAdapter::new(store.clone(), NoticeBus::default(), Duration::from_millis(100));

        let err = adapter.commit_booking(&new_booking(2)).await.unwrap_err();
        assert!(matches!(err, WriteError::Store(ref e) if e.kind == StoreErrorKind::Transient));
        assert!(store.inserted.lock().unwrap().is_empty());
    }
}
