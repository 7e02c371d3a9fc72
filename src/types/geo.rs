use serde::{Deserialize, Serialize};

/// Mean earth radius used for distance checks.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coords {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &Coords) -> f64 {
        let lat_a = self.latitude.to_radians();
        let lat_b = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let h = (d_lat / 2.0).sin().powi(2)
            + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
    }

    /// Moves the point by the given number of metres north and east.
    pub fn offset_m(&self, north_m: f64, east_m: f64) -> Coords {
        let d_lat = (north_m / EARTH_RADIUS_M).to_degrees();
        let d_lon = (east_m / (EARTH_RADIUS_M * self.latitude.to_radians().cos())).to_degrees();
        Coords::new(self.latitude + d_lat, self.longitude + d_lon)
    }
}

/// Viewport-relative pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A fix reported by the device location service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coords: Coords,
    pub timestamp_ms: i64,
}

impl Position {
    pub fn new(coords: Coords, timestamp_ms: i64) -> Self {
        Self {
            coords,
            timestamp_ms,
        }
    }
}
