//! Desktop notifications for the tray applet.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification error: {0}")]
    Notification(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

/// Sink for user-visible messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError>;
}

/// Notifications through the freedesktop notification service.
pub struct DesktopNotifier {
    appname: String,
}

impl DesktopNotifier {
    pub fn new(appname: impl Into<String>) -> Self {
        Self {
            appname: appname.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str, urgency: Urgency) -> Result<(), NotifyError> {
        let urgency = match urgency {
            Urgency::Normal => notify_rust::Urgency::Normal,
            Urgency::Critical => notify_rust::Urgency::Critical,
        };

        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .appname(&self.appname)
            .icon("media-optical")
            .urgency(urgency)
            .show()
            .map_err(|e| NotifyError::Notification(e.to_string()))?;

        Ok(())
    }
}
