use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UserLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

impl Default for UserLocation {
    // Downtown reference point the sample lots are laid out around.
    fn default() -> Self {
        Self {
            lat: 40.7128,
            lng: -74.006,
            heading: None,
        }
    }
}
