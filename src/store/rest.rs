use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ParkingStore, SlotCountUpdate, StoreError, StoreErrorKind};
use crate::models::{Booking, BookingStatus, NewBooking, ParkingLot};

/// Attempts at the compare-and-swap decrement before giving up.
const DECREMENT_ATTEMPTS: usize = 3;

/// Error codes a PostgREST-style backend returns when a table is missing.
const MISSING_RELATION_CODES: &[&str] = &["PGRST116", "PGRST205", "42P01"];

/// Remote tabular store spoken to over a PostgREST-style HTTP API.
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self::with_client(base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(base_url: String, api_key: String, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn table(&self, name: &str) -> String {
        format!("{}/rest/v1/{name}", self.base_url)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            return req;
        }
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, StoreError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| StoreError::transient(format!("request failed: {e}")))?;

        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let body: RemoteError = resp.json().await.unwrap_or_default();
        Err(classify_remote(status, &body))
    }

    async fn fetch_available_slots(&self, lot_id: &str) -> Result<u32, StoreError> {
        let resp = self
            .send(
                self.client
                    .get(self.table("parking_lots"))
                    .query(&[
                        ("id", format!("eq.{lot_id}")),
                        ("select", "available_slots".to_string()),
                    ]),
            )
            .await?;

        let rows: Vec<CounterRow> = decode(resp).await?;
        rows.first()
            .map(|row| row.available_slots)
            .ok_or_else(|| StoreError::not_found(format!("parking lot {lot_id}")))
    }

    async fn active_bookings_for_slot(
        &self,
        lot_id: &str,
        slot_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let resp = self
            .send(self.client.get(self.table("bookings")).query(&[
                ("select", "*".to_string()),
                ("parking_lot_id", format!("eq.{lot_id}")),
                ("slot_id", format!("eq.{slot_id}")),
                ("status", format!("eq.{}", BookingStatus::Active.as_str())),
            ]))
            .await?;
        let rows: Vec<BookingRow> = decode(resp).await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

/// Maps an HTTP failure onto a store error kind.
fn classify_remote(status: StatusCode, body: &RemoteError) -> StoreError {
    let code = body.code.as_deref().unwrap_or("");
    let lowered = body.message.to_lowercase();

    let kind = if MISSING_RELATION_CODES.contains(&code)
        || lowered.contains("not found")
        || lowered.contains("relation")
    {
        StoreErrorKind::NotFound
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StoreErrorKind::Unauthorized
    } else if status == StatusCode::CONFLICT || code == "23505" {
        StoreErrorKind::Conflict
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        StoreErrorKind::Transient
    } else if status == StatusCode::NOT_FOUND {
        StoreErrorKind::NotFound
    } else {
        StoreErrorKind::Unknown
    };

    let message = if body.message.is_empty() {
        format!("HTTP {status}")
    } else if code.is_empty() {
        body.message.clone()
    } else {
        format!("{} (code {code})", body.message)
    };
    StoreError::new(kind, message)
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: Response) -> Result<T, StoreError> {
    resp.json()
        .await
        .map_err(|e| StoreError::new(StoreErrorKind::Unknown, format!("malformed response: {e}")))
}

// ── Wire rows ──

#[derive(Debug, Deserialize)]
struct LotRow {
    id: String,
    name: String,
    address: String,
    lat: f64,
    lng: f64,
    total_slots: u32,
    available_slots: u32,
    price_per_hour: f64,
    distance_info: Option<f64>,
    rating: Option<f64>,
    has_camera: Option<bool>,
}

impl From<LotRow> for ParkingLot {
    fn from(row: LotRow) -> Self {
        ParkingLot {
            id: row.id,
            name: row.name,
            address: row.address,
            lat: row.lat,
            lng: row.lng,
            total_slots: row.total_slots,
            available_slots: row.available_slots,
            price_per_hour: row.price_per_hour,
            distance: row.distance_info,
            rating: row.rating.unwrap_or(0.0),
            has_camera: row.has_camera.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CounterRow {
    available_slots: u32,
}

#[derive(Debug, Serialize)]
struct BookingInsert<'a> {
    id: &'a str,
    user_id: Option<&'a str>,
    parking_lot_id: &'a str,
    parking_lot_name: &'a str,
    slot_id: &'a str,
    vehicle_number: &'a str,
    customer_name: &'a str,
    duration_hours: u32,
    total_price: f64,
    status: &'static str,
    booking_time: String,
}

#[derive(Debug, Deserialize)]
struct BookingRow {
    id: String,
    user_id: Option<String>,
    parking_lot_id: String,
    parking_lot_name: String,
    slot_id: String,
    vehicle_number: String,
    #[serde(default)]
    customer_name: Option<String>,
    duration_hours: u32,
    total_price: f64,
    status: String,
    #[serde(default)]
    booking_time: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            user_id: row.user_id,
            lot_id: row.parking_lot_id,
            lot_name: row.parking_lot_name,
            slot_id: row.slot_id,
            vehicle_number: row.vehicle_number,
            customer_name: row.customer_name.unwrap_or_default(),
            duration_hours: row.duration_hours,
            total_price: row.total_price,
            status: BookingStatus::parse(&row.status),
            booking_time: parse_remote_timestamp(row.booking_time.as_deref()),
            created_at: parse_remote_timestamp(row.created_at.as_deref()),
        }
    }
}

fn parse_remote_timestamp(s: Option<&str>) -> chrono::NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    let Some(s) = s else {
        return now;
    };
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .unwrap_or(now)
}

#[async_trait]
impl ParkingStore for RestStore {
    async fn list_lots(&self) -> Result<Vec<ParkingLot>, StoreError> {
        let resp = self
            .send(
                self.client
                    .get(self.table("parking_lots"))
                    .query(&[("select", "*")]),
            )
            .await?;
        let rows: Vec<LotRow> = decode(resp).await?;
        Ok(rows.into_iter().map(ParkingLot::from).collect())
    }

    async fn list_bookings(&self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        let resp = self
            .send(self.client.get(self.table("bookings")).query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.desc".to_string()),
            ]))
            .await?;
        let rows: Vec<BookingRow> = decode(resp).await?;
        Ok(rows.into_iter().map(Booking::from).collect())
    }

    /// Refuses the insert while another active booking still holds the
    /// slot. The check and the insert are separate requests.
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking, StoreError> {
        let now = chrono::Utc::now().naive_utc();
        let (start, end) = booking.window_from(now);
        let held = self
            .active_bookings_for_slot(&booking.lot_id, &booking.slot_id)
            .await?
            .into_iter()
            .find(|b| b.holds_slot_during(start, end));
        if let Some(held) = held {
            return Err(StoreError::conflict(format!(
                "slot {} is booked until {}",
                booking.slot_id,
                held.ends_at()
            )));
        }

        let row = BookingInsert {
            id: &booking.id,
            user_id: booking.user_id.as_deref(),
            parking_lot_id: &booking.lot_id,
            parking_lot_name: &booking.lot_name,
            slot_id: &booking.slot_id,
            vehicle_number: &booking.vehicle_number,
            customer_name: &booking.customer_name,
            duration_hours: booking.duration_hours,
            total_price: booking.total_price,
            status: BookingStatus::Active.as_str(),
            booking_time: now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        };

        let resp = self
            .send(
                self.client
                    .post(self.table("bookings"))
                    .header("Prefer", "return=representation")
                    .json(&row),
            )
            .await?;

        let mut rows: Vec<BookingRow> = decode(resp).await?;
        if rows.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::Unknown,
                "insert returned no rows",
            ));
        }
        Ok(rows.swap_remove(0).into())
    }

    /// Compare-and-swap on `available_slots`: the update only applies if the
    /// counter still holds the value just read.
    async fn decrement_available_slots(
        &self,
        lot_id: &str,
    ) -> Result<SlotCountUpdate, StoreError> {
        for attempt in 1..=DECREMENT_ATTEMPTS {
            let current = self.fetch_available_slots(lot_id).await?;
            if current == 0 {
                return Ok(SlotCountUpdate::AlreadyEmpty);
            }

            let resp = self
                .send(
                    self.client
                        .patch(self.table("parking_lots"))
                        .query(&[
                            ("id", format!("eq.{lot_id}")),
                            ("available_slots", format!("eq.{current}")),
                        ])
                        .header("Prefer", "return=representation")
                        .json(&json!({ "available_slots": current - 1 })),
                )
                .await?;

            let rows: Vec<CounterRow> = decode(resp).await?;
            if let Some(row) = rows.first() {
                return Ok(SlotCountUpdate::Decremented {
                    remaining: row.available_slots,
                });
            }

            tracing::debug!(lot_id, attempt, "available_slots changed underneath, retrying");
        }

        Err(StoreError::conflict(format!(
            "available_slots for lot {lot_id} kept changing"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: Option<&str>, message: &str) -> RemoteError {
        RemoteError {
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_missing_relation_codes() {
        for code in MISSING_RELATION_CODES {
            let e = classify_remote(StatusCode::BAD_REQUEST, &err(Some(code), "boom"));
            assert_eq!(e.kind, StoreErrorKind::NotFound, "code {code}");
        }
        let e = classify_remote(
            StatusCode::BAD_REQUEST,
            &err(None, "relation \"public.parking_lots\" does not exist"),
        );
        assert_eq!(e.kind, StoreErrorKind::NotFound);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_remote(StatusCode::UNAUTHORIZED, &err(None, "JWT expired")).kind,
            StoreErrorKind::Unauthorized
        );
        assert_eq!(
            classify_remote(StatusCode::CONFLICT, &err(Some("23505"), "duplicate key")).kind,
            StoreErrorKind::Conflict
        );
        assert_eq!(
            classify_remote(StatusCode::BAD_GATEWAY, &RemoteError::default()).kind,
            StoreErrorKind::Transient
        );
        assert_eq!(
            classify_remote(StatusCode::BAD_REQUEST, &err(Some("22P02"), "bad input")).kind,
            StoreErrorKind::Unknown
        );
    }

    #[test]
    fn test_message_keeps_code() {
        let e = classify_remote(StatusCode::BAD_REQUEST, &err(Some("42P01"), "missing"));
        assert_eq!(e.message, "missing (code 42P01)");
        let e = classify_remote(StatusCode::BAD_GATEWAY, &RemoteError::default());
        assert!(e.message.starts_with("HTTP 502"));
    }

    #[test]
    fn test_lot_row_defaults() {
        let row: LotRow = serde_json::from_str(
            r#"{"id":"a","name":"A","address":"x","lat":1.0,"lng":2.0,"total_slots":10,
                "available_slots":4,"price_per_hour":3,"distance_info":null,"rating":null,
                "has_camera":null,"created_at":"2025-01-01T00:00:00+00:00"}"#,
        )
        .unwrap();
        let lot = ParkingLot::from(row);
        assert_eq!(lot.rating, 0.0);
        assert!(!lot.has_camera);
        assert!(lot.distance.is_none());
        assert_eq!(lot.price_per_hour, 3.0);
    }

    #[test]
    fn test_remote_timestamp_parsing() {
        let ts = parse_remote_timestamp(Some("2025-03-15T14:00:00.123+00:00"));
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2025-03-15 14:00:00");
        let ts = parse_remote_timestamp(Some("2025-03-15T14:00:00"));
        assert_eq!(ts.format("%H:%M").to_string(), "14:00");
    }
}
