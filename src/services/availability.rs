use serde::Serialize;

use crate::models::ParkingLot;

/// Lots shown in the driving-mode nearby list.
pub const NEARBY_LIMIT: usize = 3;
const LIMITED_THRESHOLD_PERCENT: f64 = 30.0;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Available,
    Limited,
    Full,
}

impl Tier {
    /// Color tag shared by map markers, cards and progress bars.
    pub fn color(&self) -> &'static str {
        match self {
            Tier::Available => "available",
            Tier::Limited => "reserved",
            Tier::Full => "occupied",
        }
    }
}

pub fn availability_percent(available_slots: u32, total_slots: u32) -> f64 {
    if total_slots == 0 {
        return 0.0;
    }
    f64::from(available_slots) / f64::from(total_slots) * 100.0
}

pub fn classify(available_slots: u32, total_slots: u32) -> Tier {
    let percent = availability_percent(available_slots, total_slots);
    if percent > LIMITED_THRESHOLD_PERCENT {
        Tier::Available
    } else if percent > 0.0 {
        Tier::Limited
    } else {
        Tier::Full
    }
}

/// Booking is open for any lot not in the full tier, which also covers a
/// lot reporting free slots against a zero total.
pub fn can_book(lot: &ParkingLot) -> bool {
    classify(lot.available_slots, lot.total_slots) != Tier::Full
}

/// A lot decorated with everything a list card or map marker renders.
#[derive(Debug, Clone, Serialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub availability_percent: f64,
    pub tier: Tier,
    pub color: &'static str,
    /// Progress bar fill, 0..=100.
    pub bar_width: f64,
    pub can_book: bool,
}

impl LotView {
    pub fn new(lot: ParkingLot) -> Self {
        let percent = availability_percent(lot.available_slots, lot.total_slots);
        let tier = classify(lot.available_slots, lot.total_slots);
        Self {
            availability_percent: percent,
            tier,
            color: tier.color(),
            bar_width: percent.clamp(0.0, 100.0),
            can_book: can_book(&lot),
            lot,
        }
    }
}

/// Case-insensitive substring match on name or address.
pub fn search<'a>(lots: &'a [ParkingLot], query: &str) -> Vec<&'a ParkingLot> {
    let needle = query.trim().to_lowercase();
    lots.iter()
        .filter(|lot| {
            needle.is_empty()
                || lot.name.to_lowercase().contains(&needle)
                || lot.address.to_lowercase().contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Nearby {
    pub lots: Vec<ParkingLot>,
    pub total_available: u32,
}

/// Closest lots first (missing distance counts as zero), capped at
/// `NEARBY_LIMIT`, with their combined free slots.
pub fn nearby(lots: &[ParkingLot]) -> Nearby {
    let mut sorted = lots.to_vec();
    sorted.sort_by(|a, b| {
        a.distance
            .unwrap_or(0.0)
            .total_cmp(&b.distance.unwrap_or(0.0))
    });
    sorted.truncate(NEARBY_LIMIT);

    let total_available = sorted.iter().map(|lot| lot.available_slots).sum();
    Nearby {
        lots: sorted,
        total_available,
    }
}
