pub mod availability;
pub mod booking_flow;
pub mod driving;
pub mod flow_registry;
pub mod notices;
pub mod notification;
pub mod session;
pub mod slots;
pub mod sync;
