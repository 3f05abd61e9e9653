use rand::Rng;
use serde::Serialize;

use crate::models::{ParkingSlot, SlotStatus, VehicleType};

pub const SLOTS_PER_FLOOR: usize = 50;
/// Slots rendered per floor in the booking view.
pub const DISPLAY_PER_FLOOR: usize = 20;

/// Builds a fresh slot grid for a lot. The shape (ids, floors, labels) is
/// fixed by `total_slots` and `cap`; status and vehicle type are drawn from
/// `rng` on every call.
pub fn generate<R: Rng>(
    lot_id: &str,
    total_slots: u32,
    cap: usize,
    rng: &mut R,
) -> Vec<ParkingSlot> {
    let count = (total_slots as usize).min(cap);

    (0..count)
        .map(|i| {
            let floor = i / SLOTS_PER_FLOOR + 1;
            let position = i % SLOTS_PER_FLOOR + 1;

            ParkingSlot {
                id: format!("{lot_id}-slot-{i}"),
                lot_id: lot_id.to_string(),
                slot_number: format!("{}{position:02}", floor_letter(floor)),
                floor: floor as u32,
                status: status_for(rng.gen::<f64>()),
                vehicle_type: vehicle_type_for(rng.gen::<f64>()),
            }
        })
        .collect()
}

pub fn floor_letter(floor: usize) -> char {
    // floors past Z wrap; lots that large are never rendered
    (b'A' + ((floor.saturating_sub(1)) % 26) as u8) as char
}

fn status_for(draw: f64) -> SlotStatus {
    if draw > 0.7 {
        SlotStatus::Available
    } else if draw > 0.1 {
        SlotStatus::Occupied
    } else {
        SlotStatus::Reserved
    }
}

fn vehicle_type_for(draw: f64) -> VehicleType {
    if draw > 0.8 {
        VehicleType::Ev
    } else if draw > 0.1 {
        VehicleType::Car
    } else {
        VehicleType::Motorcycle
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FloorGrid {
    pub floor: u32,
    pub slots: Vec<ParkingSlot>,
}

/// Groups slots by floor in ascending order, keeping at most
/// `DISPLAY_PER_FLOOR` per floor.
pub fn group_by_floor(slots: &[ParkingSlot]) -> Vec<FloorGrid> {
    let mut grids: Vec<FloorGrid> = Vec::new();
    for slot in slots {
        match grids.iter_mut().find(|g| g.floor == slot.floor) {
            Some(grid) => {
                if grid.slots.len() < DISPLAY_PER_FLOOR {
                    grid.slots.push(slot.clone());
                }
            }
            None => grids.push(FloorGrid {
                floor: slot.floor,
                slots: vec![slot.clone()],
            }),
        }
    }
    grids.sort_by_key(|g| g.floor);
    grids
}
