use serde::Serialize;

use crate::models::Booking;

const WHATSAPP_BASE: &str = "https://wa.me";

/// Deep link the client opens to hand the booking alert to WhatsApp. Nothing
/// is sent by the service itself and delivery is not tracked.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WhatsAppAlert {
    pub to: String,
    pub text: String,
    pub url: String,
}

pub fn booking_message(booking: &Booking) -> String {
    format!(
        "*New Booking Alert!* 🚗\n\n\
         *User:* {}\n\
         *Parking Lot:* {}\n\
         🚗 Vehicle: {}\n\
         ⏰ Duration: {} hours\n\
         💰 Total: ${}\n\n\
         See you soon!",
        booking.customer_name,
        booking.lot_name,
        booking.vehicle_number,
        booking.duration_hours,
        booking.total_price,
    )
}

pub fn booking_alert(booking: &Booking, admin_number: &str) -> anyhow::Result<WhatsAppAlert> {
    let to: String = admin_number.chars().filter(|c| c.is_ascii_digit()).collect();
    anyhow::ensure!(!to.is_empty(), "admin WhatsApp number has no digits: {admin_number:?}");

    let text = booking_message(booking);
    // wa.me wants %20 for spaces, not the form-style '+'
    let url = format!("{WHATSAPP_BASE}/{to}?text={}", urlencoding::encode(&text));

    Ok(WhatsAppAlert { to, text, url })
}
