pub mod booking;
pub mod location;
pub mod notice;
pub mod parking_lot;
pub mod session;
pub mod slot;

pub use booking::{
    is_offered_duration, Booking, BookingStatus, NewBooking, DEFAULT_DURATION_HOURS, DURATION_MENU,
};
pub use location::UserLocation;
pub use notice::{Notice, NoticeLevel};
pub use parking_lot::{sample_lots, ParkingLot};
pub use session::Session;
pub use slot::{ParkingSlot, SlotStatus, VehicleType};
