use anyhow::Result;
use notify_rust::{Notification, Timeout};

/// 桌面通知能力
pub trait Notifier: Send {
    fn show_notification(&self, title: &str, body: &str);
}

/// 通知管理器
pub struct NotificationManager {
    enabled: bool,
}

impl NotificationManager {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn send(&self, title: &str, body: &str) -> Result<()> {
        Notification::new()
            .appname("Pomodoro")
            .summary(&format!("🍅 {}", title))
            .body(body)
            .icon("alarm-clock")
            .timeout(Timeout::Milliseconds(5000))
            .show()?;
        Ok(())
    }
}

impl Notifier for NotificationManager {
    fn show_notification(&self, title: &str, body: &str) {
        if !self.enabled {
            tracing::debug!("Notifications disabled, skipping {:?}", title);
            return;
        }
        if let Err(e) = self.send(title, body) {
            tracing::warn!("Failed to show notification: {}", e);
        }
    }
}
