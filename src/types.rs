pub mod alert;
pub mod geo;
pub mod user;

pub use alert::{Alert, AlertChange, AlertKind, AlertWindowDelta, ChangeKind, NewAlert};
pub use geo::{Coords, Position, ScreenPoint};
pub use user::{UserPatch, UserRecord};
