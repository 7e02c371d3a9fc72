use crate::types::{Coords, ScreenPoint};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("viewport transform unavailable")]
    Unavailable,
    #[error("coordinate cannot be projected: {0:?}")]
    OutOfRange(Coords),
}

/// The current camera transform of the map.
pub trait Viewport: Send + Sync {
    fn point_for<'a>(
        &'a self,
        coords: Coords,
    ) -> impl Future<Output = Result<ScreenPoint, ProjectionError>> + Send + 'a;
}
