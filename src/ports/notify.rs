use crate::ports::PermissionStatus;

/// A notification shown immediately on this device.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalNotification {
    pub title: String,
    pub body: String,
    pub sound: bool,
    pub high_priority: bool,
    /// Key/value payload handed back when the notification is opened.
    pub data: Vec<(String, String)>,
}

/// Whether notifications are presented while the app is in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundPresentation {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
}

impl ForegroundPresentation {
    pub const ALERT_WITH_SOUND: ForegroundPresentation = ForegroundPresentation {
        show_alert: true,
        play_sound: true,
        set_badge: false,
    };
}

pub trait Notifier: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn present<'a>(&'a self, notification: &'a LocalNotification) -> Self::Fut<'a>;

    fn permission(&self)
    -> impl Future<Output = Result<PermissionStatus, Self::Error>> + Send + '_;

    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, Self::Error>> + Send + '_;

    /// Registers the process-wide foreground handler.
    fn set_foreground_presentation(&self, presentation: ForegroundPresentation);
}
