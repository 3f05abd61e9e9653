use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::{
    is_offered_duration, NewBooking, NoticeLevel, ParkingLot, ParkingSlot, Session,
    DEFAULT_DURATION_HOURS, DURATION_MENU,
};
use crate::services::availability::{self, Tier};
use crate::services::notices::NoticeBus;
use crate::services::notification::{self, WhatsAppAlert};
use crate::services::slots::{self, FloorGrid};
use crate::services::sync::{SyncAdapter, WriteError};
use crate::store::{BookingCommit, SlotCountUpdate};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Slots,
    Details,
    Confirm,
    Submitted,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Slots => "slots",
            FlowStep::Details => "details",
            FlowStep::Confirm => "confirm",
            FlowStep::Submitted => "submitted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("{0} is full")]
    LotFull(String),

    #[error("not allowed at the {} step", .0.as_str())]
    WrongStep(FlowStep),

    #[error("select an available slot first")]
    NoSlotSelected,

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("a {0} hour booking is not offered")]
    InvalidDuration(u32),

    #[error("a booking is already being submitted")]
    Busy,

    #[error("booking flow {0} not found")]
    UnknownFlow(String),

    #[error(transparent)]
    Write(#[from] WriteError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingDetails {
    pub customer_name: String,
    pub vehicle_number: String,
    pub whatsapp_number: String,
    pub duration_hours: u32,
}

impl Default for BookingDetails {
    fn default() -> Self {
        Self {
            customer_name: String::new(),
            vehicle_number: String::new(),
            whatsapp_number: String::new(),
            duration_hours: DEFAULT_DURATION_HOURS,
        }
    }
}

impl BookingDetails {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.customer_name.trim().is_empty() {
            missing.push("customer_name");
        }
        if self.vehicle_number.trim().is_empty() {
            missing.push("vehicle_number");
        }
        if self.whatsapp_number.trim().is_empty() {
            missing.push("whatsapp_number");
        }
        missing
    }
}

/// Partial edit of the details form. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailsUpdate {
    pub customer_name: Option<String>,
    pub vehicle_number: Option<String>,
    pub whatsapp_number: Option<String>,
    pub duration_hours: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub booking_id: String,
    pub slot_number: String,
    pub total_price: f64,
    pub slots: SlotCountUpdate,
    pub alert: Option<WhatsAppAlert>,
}

/// One booking modal: slot pick, details, review, submit.
#[derive(Debug, Clone)]
pub struct BookingFlow {
    id: String,
    lot: ParkingLot,
    slots: Vec<ParkingSlot>,
    step: FlowStep,
    selected: Option<ParkingSlot>,
    details: BookingDetails,
    busy: bool,
}

impl BookingFlow {
    /// Opens a flow with a freshly generated slot grid. Full lots refuse.
    pub fn open<R: Rng>(lot: ParkingLot, slot_cap: usize, rng: &mut R) -> Result<Self, FlowError> {
        if availability::classify(lot.available_slots, lot.total_slots) == Tier::Full {
            return Err(FlowError::LotFull(lot.name));
        }

        let slots = slots::generate(&lot.id, lot.total_slots, slot_cap, rng);
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            lot,
            slots,
            step: FlowStep::Slots,
            selected: None,
            details: BookingDetails::default(),
            busy: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn lot(&self) -> &ParkingLot {
        &self.lot
    }

    pub fn slots(&self) -> &[ParkingSlot] {
        &self.slots
    }

    pub fn selected(&self) -> Option<&ParkingSlot> {
        self.selected.as_ref()
    }

    pub fn details(&self) -> &BookingDetails {
        &self.details
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn total_price(&self) -> f64 {
        self.lot.total_for(self.details.duration_hours)
    }

    /// Picks a slot on the grid. Unknown or unavailable slots, and any pick
    /// outside the slot step, leave the selection untouched.
    pub fn select_slot(&mut self, slot_id: &str) -> bool {
        if self.step != FlowStep::Slots {
            return false;
        }
        match self
            .slots
            .iter()
            .find(|s| s.id == slot_id && s.is_available())
        {
            Some(slot) => {
                self.selected = Some(slot.clone());
                true
            }
            None => false,
        }
    }

    pub fn continue_to_details(&mut self) -> Result<(), FlowError> {
        if self.step != FlowStep::Slots {
            return Err(FlowError::WrongStep(self.step));
        }
        if self.selected.is_none() {
            return Err(FlowError::NoSlotSelected);
        }
        self.step = FlowStep::Details;
        Ok(())
    }

    pub fn update_details(&mut self, update: DetailsUpdate) -> Result<(), FlowError> {
        if self.step != FlowStep::Details {
            return Err(FlowError::WrongStep(self.step));
        }
        if let Some(hours) = update.duration_hours {
            if !is_offered_duration(hours) {
                return Err(FlowError::InvalidDuration(hours));
            }
            self.details.duration_hours = hours;
        }
        if let Some(name) = update.customer_name {
            self.details.customer_name = name;
        }
        if let Some(vehicle) = update.vehicle_number {
            self.details.vehicle_number = vehicle.to_uppercase();
        }
        if let Some(number) = update.whatsapp_number {
            self.details.whatsapp_number = number;
        }
        Ok(())
    }

    pub fn review(&mut self) -> Result<(), FlowError> {
        if self.step != FlowStep::Details {
            return Err(FlowError::WrongStep(self.step));
        }
        let missing = self.details.missing_fields();
        if !missing.is_empty() {
            return Err(FlowError::MissingFields(missing));
        }
        self.step = FlowStep::Confirm;
        Ok(())
    }

    pub fn back(&mut self) {
        if self.busy {
            return;
        }
        self.step = match self.step {
            FlowStep::Confirm => FlowStep::Details,
            FlowStep::Details => FlowStep::Slots,
            other => other,
        };
    }

    /// Marks the flow busy and returns the row to write. Only one submit
    /// can be in flight per flow.
    pub fn begin_submit(&mut self, session: Option<&Session>) -> Result<NewBooking, FlowError> {
        if self.busy {
            return Err(FlowError::Busy);
        }
        if self.step != FlowStep::Confirm {
            return Err(FlowError::WrongStep(self.step));
        }
        let slot = self.selected.as_ref().ok_or(FlowError::NoSlotSelected)?;
        let missing = self.details.missing_fields();
        if !missing.is_empty() {
            return Err(FlowError::MissingFields(missing));
        }

        self.busy = true;
        Ok(NewBooking {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: session.map(|s| s.user_id.clone()),
            lot_id: self.lot.id.clone(),
            lot_name: self.lot.name.clone(),
            slot_id: slot.id.clone(),
            vehicle_number: self.details.vehicle_number.trim().to_string(),
            customer_name: self.details.customer_name.trim().to_string(),
            duration_hours: self.details.duration_hours,
            total_price: self.total_price(),
        })
    }

    /// Applies the store's answer to a submit started with `begin_submit`.
    /// Success ends the flow; failure returns it to the confirm step.
    pub fn finish_submit(
        &mut self,
        result: Result<BookingCommit, WriteError>,
        admin_number: &str,
        notices: &NoticeBus,
    ) -> Result<SubmitReceipt, FlowError> {
        self.busy = false;

        let commit = match result {
            Ok(commit) => commit,
            Err(e) => {
                tracing::error!(flow_id = %self.id, lot_id = %self.lot.id, error = %e, "booking failed");
                notices.publish_to_flow(&self.id, NoticeLevel::Error, e.to_string());
                self.step = FlowStep::Confirm;
                return Err(e.into());
            }
        };

        self.step = FlowStep::Submitted;
        let slot_number = self
            .selected
            .as_ref()
            .map(|s| s.slot_number.clone())
            .unwrap_or_default();

        let alert = match notification::booking_alert(&commit.booking, admin_number) {
            Ok(alert) => Some(alert),
            Err(e) => {
                tracing::error!(error = %e, "could not build WhatsApp alert");
                None
            }
        };

        notices.publish_to_flow(
            &self.id,
            NoticeLevel::Success,
            format!("Booking confirmed! Slot {slot_number} booked. Sending WhatsApp alert to support."),
        );

        Ok(SubmitReceipt {
            booking_id: commit.booking.id,
            slot_number,
            total_price: commit.booking.total_price,
            slots: commit.slots,
            alert,
        })
    }

    /// Runs the whole submit step against `sync`. Use `begin_submit` and
    /// `finish_submit` directly when the flow lives behind a lock.
    pub async fn submit(
        &mut self,
        sync: &SyncAdapter,
        session: Option<&Session>,
        admin_number: &str,
    ) -> Result<SubmitReceipt, FlowError> {
        let booking = self.begin_submit(session)?;
        let result = sync.commit_booking(&booking).await;
        self.finish_submit(result, admin_number, sync.notices())
    }

    pub fn view(&self) -> FlowView {
        FlowView {
            id: self.id.clone(),
            lot: availability::LotView::new(self.lot.clone()),
            step: self.step,
            floors: slots::group_by_floor(&self.slots),
            selected: self.selected.clone(),
            details: self.details.clone(),
            duration_options: DURATION_MENU.to_vec(),
            total_price: self.total_price(),
            busy: self.busy,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowView {
    pub id: String,
    pub lot: availability::LotView,
    pub step: FlowStep,
    pub floors: Vec<FloorGrid>,
    pub selected: Option<ParkingSlot>,
    pub details: BookingDetails,
    pub duration_options: Vec<u32>,
    pub total_price: f64,
    pub busy: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::db;
    use crate::models::{sample_lots, SlotStatus};
    use crate::store::sqlite::SqliteStore;
    use crate::store::{ParkingStore, StoreError};

    fn lot() -> ParkingLot {
        sample_lots().remove(0)
    }

    fn open(lot: ParkingLot) -> BookingFlow {
        BookingFlow::open(lot, 30, &mut StdRng::seed_from_u64(42)).unwrap()
    }

    fn first_with(flow: &BookingFlow, available: bool) -> String {
        flow.slots()
            .iter()
            .find(|s| s.is_available() == available)
            .map(|s| s.id.clone())
            .expect("seeded grid has both kinds of slot")
    }

    fn filled() -> DetailsUpdate {
        DetailsUpdate {
            customer_name: Some("Alice".to_string()),
            vehicle_number: Some("abc 1234".to_string()),
            whatsapp_number: Some("+1 234 567 8900".to_string()),
            duration_hours: None,
        }
    }

    fn at_confirm() -> BookingFlow {
        let mut flow = open(lot());
        let slot = first_with(&flow, true);
        assert!(flow.select_slot(&slot));
        flow.continue_to_details().unwrap();
        flow.update_details(filled()).unwrap();
        flow.review().unwrap();
        flow
    }

    #[test]
    fn test_open_refuses_full_lot() {
        let full = sample_lots().remove(4);
        let err = BookingFlow::open(full, 30, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, FlowError::LotFull(_)));
    }

    #[test]
    fn test_open_generates_capped_grid() {
        let flow = open(lot());
        assert_eq!(flow.slots().len(), 30);
        assert_eq!(flow.step(), FlowStep::Slots);
        assert_eq!(flow.details().duration_hours, 2);
    }

    #[test]
    fn test_unavailable_slot_is_ignored() {
        let mut flow = open(lot());
        let taken = first_with(&flow, false);
        assert!(!flow.select_slot(&taken));
        assert!(flow.selected().is_none());

        let free = first_with(&flow, true);
        assert!(flow.select_slot(&free));
        assert!(!flow.select_slot(&taken));
        assert_eq!(flow.selected().unwrap().id, free);
        assert!(!flow.select_slot("no-such-slot"));
        assert_eq!(flow.selected().unwrap().status, SlotStatus::Available);
    }

    #[test]
    fn test_continue_requires_selection() {
        let mut flow = open(lot());
        assert!(matches!(flow.continue_to_details(), Err(FlowError::NoSlotSelected)));
        assert_eq!(flow.step(), FlowStep::Slots);
    }

    #[test]
    fn test_review_requires_every_field() {
        let mut flow = open(lot());
        let slot = first_with(&flow, true);
        flow.select_slot(&slot);
        flow.continue_to_details().unwrap();

        for blank in 0..3 {
            let mut update = filled();
            match blank {
                0 => update.customer_name = Some("   ".to_string()),
                1 => update.vehicle_number = Some(String::new()),
                _ => update.whatsapp_number = Some(String::new()),
            }
            flow.update_details(update).unwrap();
            assert!(matches!(flow.review(), Err(FlowError::MissingFields(_))));
            assert_eq!(flow.step(), FlowStep::Details);
        }

        flow.update_details(filled()).unwrap();
        flow.review().unwrap();
        assert_eq!(flow.step(), FlowStep::Confirm);
    }

    #[test]
    fn test_vehicle_number_is_uppercased() {
        let flow = at_confirm();
        assert_eq!(flow.details().vehicle_number, "ABC 1234");
    }

    #[test]
    fn test_duration_menu_and_price() {
        let mut flow = open(lot());
        let slot = first_with(&flow, true);
        flow.select_slot(&slot);
        flow.continue_to_details().unwrap();

        for hours in DURATION_MENU {
            flow.update_details(DetailsUpdate {
                duration_hours: Some(hours),
                ..Default::default()
            })
            .unwrap();
            assert_eq!(flow.total_price(), 5.0 * hours as f64);
        }

        let err = flow
            .update_details(DetailsUpdate {
                duration_hours: Some(3),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidDuration(3)));
        assert_eq!(flow.details().duration_hours, 8);
    }

    #[test]
    fn test_back_walks_one_step() {
        let mut flow = at_confirm();
        flow.back();
        assert_eq!(flow.step(), FlowStep::Details);
        flow.back();
        assert_eq!(flow.step(), FlowStep::Slots);
        flow.back();
        assert_eq!(flow.step(), FlowStep::Slots);
        assert!(flow.selected().is_some());
    }

    #[test]
    fn test_submit_only_from_confirm() {
        let mut flow = open(lot());
        assert!(matches!(
            flow.begin_submit(None),
            Err(FlowError::WrongStep(FlowStep::Slots))
        ));
    }

    #[test]
    fn test_second_submit_while_busy_is_rejected() {
        let mut flow = at_confirm();
        let booking = flow.begin_submit(Some(&Session::new("u1"))).unwrap();
        assert_eq!(booking.user_id.as_deref(), Some("u1"));
        assert_eq!(booking.total_price, 10.0);
        assert!(flow.is_busy());
        assert!(matches!(flow.begin_submit(None), Err(FlowError::Busy)));

        flow.back();
        assert_eq!(flow.step(), FlowStep::Confirm);
    }

    #[test]
    fn test_failed_write_returns_to_confirm() {
        let notices = NoticeBus::default();
        let mut rx = notices.subscribe();
        let mut flow = at_confirm();
        flow.begin_submit(None).unwrap();

        let err = flow
            .finish_submit(
                Err(WriteError::Store(StoreError::transient("offline"))),
                "916385557932",
                &notices,
            )
            .unwrap_err();
        assert!(matches!(err, FlowError::Write(_)));
        assert_eq!(flow.step(), FlowStep::Confirm);
        assert!(!flow.is_busy());
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.flow_id.as_deref(), Some(flow.id()));

        // retry is allowed
        assert!(flow.begin_submit(None).is_ok());
    }

    #[tokio::test]
    async fn test_last_slot_booking_fills_lot() {
        let conn = db::init_db(":memory:").unwrap();
        let mut last = lot();
        last.total_slots = 100;
        last.available_slots = 1;
        db::queries::upsert_lot(&conn, &last).unwrap();

        let store = Arc::new(SqliteStore::new(Arc::new(std::sync::Mutex::new(conn))));
        let sync = SyncAdapter::new(store.clone(), NoticeBus::default(), Duration::from_secs(5));

        let mut flow = BookingFlow::open(last.clone(), 30, &mut StdRng::seed_from_u64(42)).unwrap();
        let slot = first_with(&flow, true);
        flow.select_slot(&slot);
        flow.continue_to_details().unwrap();
        flow.update_details(filled()).unwrap();
        flow.review().unwrap();

        let receipt = flow.submit(&sync, None, "916385557932").await.unwrap();
        assert_eq!(receipt.slots, SlotCountUpdate::Decremented { remaining: 0 });
        assert_eq!(flow.step(), FlowStep::Submitted);
        assert!(receipt.alert.unwrap().url.starts_with("https://wa.me/916385557932?text="));

        let refreshed = store
            .list_lots()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.id == last.id)
            .unwrap();
        assert_eq!(refreshed.available_slots, 0);
        assert_eq!(
            availability::classify(refreshed.available_slots, refreshed.total_slots),
            Tier::Full
        );
        assert!(!availability::can_book(&refreshed));
        assert!(matches!(
            BookingFlow::open(refreshed, 30, &mut StdRng::seed_from_u64(3)),
            Err(FlowError::LotFull(_))
        ));
    }
}
