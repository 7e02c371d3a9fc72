use tracing::{error, warn};

use crate::ports::{ForegroundPresentation, LocalNotification, Notifier};
use crate::types::Alert;

/// Returns whether notifications may be shown, asking the user if needed.
/// Errors count as "not granted".
pub async fn request_notification_permission<N: Notifier>(notifier: &N) -> bool {
    let current = match notifier.permission().await {
        Ok(status) => status,
        Err(err) => {
            error!(%err, "failed to query notification permission");
            return false;
        }
    };
    if current.is_granted() {
        return true;
    }

    match notifier.request_permission().await {
        Ok(status) => status.is_granted(),
        Err(err) => {
            error!(%err, "failed to request notification permission");
            false
        }
    }
}

/// Show alerts with sound while the app is foregrounded, without a badge.
pub fn install_foreground_presentation<N: Notifier>(notifier: &N) {
    notifier.set_foreground_presentation(ForegroundPresentation::ALERT_WITH_SOUND);
}

pub(crate) fn notification_for(alert: &Alert) -> LocalNotification {
    LocalNotification {
        title: format!("{} {}", alert.kind.emoji(), alert.user_name),
        body: alert.message.clone(),
        sound: true,
        high_priority: true,
        data: vec![
            ("alertId".to_string(), alert.id.clone()),
            ("type".to_string(), alert.kind.label().to_string()),
        ],
    }
}

pub(crate) async fn present_alert<N: Notifier>(notifier: &N, alert: &Alert) {
    let notification = notification_for(alert);
    if let Err(err) = notifier.present(&notification).await {
        warn!(%err, alert = %alert.id, "failed to present alert notification");
    }
}
