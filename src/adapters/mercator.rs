use std::f64::consts::PI;
use std::future::ready;

use crate::ports::{ProjectionError, Viewport};
use crate::types::{Coords, ScreenPoint};

const TILE_SIZE: f64 = 256.0;

/// Web Mercator cannot represent latitudes beyond this.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// A web mercator camera: a center, a zoom level and a screen size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercatorViewport {
    center: Coords,
    zoom: f64,
    width: f64,
    height: f64,
}

impl WebMercatorViewport {
    pub fn new(center: Coords, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            zoom,
            width,
            height,
        }
    }

    /// Frames `longitude_delta` degrees across the screen width.
    pub fn from_region(center: Coords, longitude_delta: f64, width: f64, height: f64) -> Self {
        let zoom = (360.0 * width / (TILE_SIZE * longitude_delta)).log2();
        Self::new(center, zoom, width, height)
    }

    pub fn center(&self) -> Coords {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan_to(&mut self, center: Coords) {
        self.center = center;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * self.zoom.exp2()
    }

    fn world_point(&self, coords: Coords) -> (f64, f64) {
        let size = self.world_size();
        let x = (coords.longitude + 180.0) / 360.0 * size;
        let sin = coords.latitude.to_radians().sin();
        let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;
        (x, y)
    }

    pub fn project(&self, coords: Coords) -> Result<ScreenPoint, ProjectionError> {
        if self.width <= 0.0 || self.height <= 0.0 || !self.zoom.is_finite() {
            return Err(ProjectionError::Unavailable);
        }
        if !coords.is_valid() || coords.latitude.abs() > MAX_LATITUDE {
            return Err(ProjectionError::OutOfRange(coords));
        }

        let size = self.world_size();
        let (center_x, center_y) = self.world_point(self.center);
        let (x, y) = self.world_point(coords);

        // The shorter way around the antimeridian.
        let mut dx = x - center_x;
        if dx > size / 2.0 {
            dx -= size;
        } else if dx < -size / 2.0 {
            dx += size;
        }

        Ok(ScreenPoint::new(
            self.width / 2.0 + dx,
            self.height / 2.0 + (y - center_y),
        ))
    }
}

impl Viewport for WebMercatorViewport {
    fn point_for<'a>(
        &'a self,
        coords: Coords,
    ) -> impl Future<Output = Result<ScreenPoint, ProjectionError>> + Send + 'a {
        ready(self.project(coords))
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    fn sao_paulo() -> Coords {
        Coords::new(-23.5505, -46.6333)
    }

    #[test]
    fn project__should_place_center_mid_screen() {
        let viewport = WebMercatorViewport::new(sao_paulo(), 15.0, 400.0, 800.0);

        let point = viewport.project(sao_paulo()).expect("project");

        assert!((point.x - 200.0).abs() < EPSILON);
        assert!((point.y - 400.0).abs() < EPSILON);
    }

    #[test]
    fn project__should_grow_east_and_south() {
        // Given
        let viewport = WebMercatorViewport::new(sao_paulo(), 15.0, 400.0, 800.0);

        // When
        let east = viewport.project(sao_paulo().offset_m(0.0, 50.0)).expect("east");
        let north = viewport.project(sao_paulo().offset_m(50.0, 0.0)).expect("north");

        // Then
        assert!(east.x > 200.0);
        assert!(north.y < 400.0);
    }

    #[test]
    fn from_region__should_fit_longitude_span_to_width() {
        // Given
        let center = Coords::new(0.0, 10.0);
        let viewport = WebMercatorViewport::from_region(center, 0.01, 400.0, 800.0);

        // When
        let edge = viewport.project(Coords::new(0.0, 10.005)).expect("edge");

        // Then
        assert!((edge.x - 400.0).abs() < 1e-3);
    }

    #[test]
    fn project__should_wrap_across_antimeridian() {
        let viewport = WebMercatorViewport::new(Coords::new(0.0, 179.9), 10.0, 400.0, 400.0);

        let point = viewport.project(Coords::new(0.0, -179.9)).expect("project");

        assert!(point.x > 200.0);
        assert!(point.x < 400.0);
    }

    #[test]
    fn project__should_reject_empty_viewport_and_polar_coords() {
        // Given
        let mut viewport = WebMercatorViewport::new(sao_paulo(), 15.0, 0.0, 800.0);

        // Then
        assert_eq!(viewport.project(sao_paulo()), Err(ProjectionError::Unavailable));
        viewport.resize(400.0, 800.0);
        let polar = Coords::new(89.0, 0.0);
        assert_eq!(viewport.project(polar), Err(ProjectionError::OutOfRange(polar)));
    }
}
