use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Occupied,
    Reserved,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Occupied => "occupied",
            SlotStatus::Reserved => "reserved",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Ev,
}

/// One space in a lot's slot grid. Regenerated every time the grid is
/// opened, so only `id` is stable between renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingSlot {
    pub id: String,
    pub lot_id: String,
    pub slot_number: String,
    pub floor: u32,
    pub status: SlotStatus,
    pub vehicle_type: VehicleType,
}

impl ParkingSlot {
    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }
}
