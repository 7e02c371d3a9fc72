pub mod adapters;
pub mod alerts;
pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod location;
pub mod ports;
pub mod presence;
pub mod projection;
pub mod session;
pub mod sim;
pub mod state;
pub mod types;

#[cfg(test)]
mod testing;

pub use alerts::{AlertListener, AlertSender, recent_alerts_by_user};
pub use auth::{AuthError, AuthFailure, Credentials, SignedIn, sign_in_or_register};
pub use config::SyncConfig;
pub use error::{ConfigError, LocationError, StoreError, SyncError};
pub use feed::{CancelHandle, Feed};
pub use location::{LocationPublisher, TrackingHandle};
pub use presence::{fetch_user, watch_presence, watch_user};
pub use projection::{PositionProjector, project_users};
pub use session::{ActiveSession, Session, SessionServices, sender_display_name};
pub use state::MapState;
