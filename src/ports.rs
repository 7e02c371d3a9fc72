mod auth;
mod clock;
mod location;
mod notify;
mod store;
mod viewport;

pub use auth::Authenticator;
pub use clock::{TimeProvider, unix_millis};
pub use location::{LocationService, PermissionStatus, SamplingPolicy};
pub use notify::{ForegroundPresentation, LocalNotification, Notifier};
pub use store::RecordStore;
pub use viewport::{ProjectionError, Viewport};
