use strum_macros::{AsRefStr, Display};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Sink for short-lived, non-blocking user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NotificationLevel::Success, message)
    }

    fn info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message)
    }

    fn warning(&self, message: &str) {
        self.notify(NotificationLevel::Warning, message)
    }

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message)
    }
}

/// Routes notifications to the log, for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = %level, "{message}")
            }
            NotificationLevel::Warning => warn!(level = %level, "{message}"),
            NotificationLevel::Error => error!(level = %level, "{message}"),
        }
    }
}
