use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingLot {
    pub id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub total_slots: u32,
    pub available_slots: u32,
    pub price_per_hour: f64,
    /// Kilometres from the reference point, when the store knows it.
    pub distance: Option<f64>,
    pub rating: f64,
    pub has_camera: bool,
}

impl ParkingLot {
    pub fn total_for(&self, duration_hours: u32) -> f64 {
        self.price_per_hour * f64::from(duration_hours)
    }
}

/// Bundled lots served whenever the store cannot be read.
pub fn sample_lots() -> Vec<ParkingLot> {
    vec![
        ParkingLot {
            id: "1".to_string(),
            name: "City Center Parking".to_string(),
            address: "123 Main Street, Downtown".to_string(),
            lat: 40.7128,
            lng: -74.006,
            total_slots: 150,
            available_slots: 45,
            price_per_hour: 5.0,
            distance: Some(0.3),
            rating: 4.5,
            has_camera: true,
        },
        ParkingLot {
            id: "2".to_string(),
            name: "Mall Parking Complex".to_string(),
            address: "456 Shopping Ave, Central".to_string(),
            lat: 40.7148,
            lng: -74.008,
            total_slots: 300,
            available_slots: 120,
            price_per_hour: 4.0,
            distance: Some(0.5),
            rating: 4.2,
            has_camera: true,
        },
        ParkingLot {
            id: "3".to_string(),
            name: "Airport Parking Zone".to_string(),
            address: "789 Airport Blvd".to_string(),
            lat: 40.7168,
            lng: -74.012,
            total_slots: 500,
            available_slots: 200,
            price_per_hour: 8.0,
            distance: Some(2.1),
            rating: 4.8,
            has_camera: true,
        },
        ParkingLot {
            id: "4".to_string(),
            name: "Tech Park Garage".to_string(),
            address: "321 Innovation Drive".to_string(),
            lat: 40.7108,
            lng: -74.004,
            total_slots: 200,
            available_slots: 15,
            price_per_hour: 6.0,
            distance: Some(0.8),
            rating: 4.6,
            has_camera: true,
        },
        ParkingLot {
            id: "5".to_string(),
            name: "Riverside Parking".to_string(),
            address: "555 River Road".to_string(),
            lat: 40.7098,
            lng: -74.010,
            total_slots: 100,
            available_slots: 0,
            price_per_hour: 3.0,
            distance: Some(1.2),
            rating: 3.9,
            has_camera: false,
        },
    ]
}
