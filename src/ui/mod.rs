use std::io::Write;

use crate::application::ConsumerEvent;

pub const CHANNEL_ID: &str = "download_channel";
pub const CHANNEL_NAME: &str = "File download";
pub const CHANNEL_DESCRIPTION: &str = "Shows progress while a file downloads";
pub const NOTIFICATION_ID: u32 = 1;
pub const NOTIFICATION_TITLE: &str = "Download your file...";

/// User-facing side channel used while a job runs in the background.
pub trait Notifier: Send + Sync {
    /// Show an ongoing, indeterminate progress notification.
    fn show_progress(&self, title: &str);

    fn clear_progress(&self);

    /// Short one-off message
    fn toast(&self, message: &str);
}

/// Writes notifications to stderr so they do not mix with the status line.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn show_progress(&self, title: &str) {
        tracing::debug!(
            channel = CHANNEL_ID,
            description = CHANNEL_DESCRIPTION,
            id = NOTIFICATION_ID,
            "progress notification shown"
        );
        let _ = writeln!(std::io::stderr(), "[{CHANNEL_NAME}] {title}");
    }

    fn clear_progress(&self) {
        tracing::debug!(channel = CHANNEL_ID, id = NOTIFICATION_ID, "progress notification cleared");
    }

    fn toast(&self, message: &str) {
        let _ = writeln!(std::io::stderr(), "{message}");
    }
}

/// Main view state
pub struct StatusView {
    pub status_message: String,
    pub is_downloading: bool,
}

impl Default for StatusView {
    fn default() -> Self {
        Self {
            status_message: "Press to download".to_string(),
            is_downloading: false,
        }
    }
}

impl StatusView {
    pub fn update(&mut self, event: &ConsumerEvent) {
        match event {
            ConsumerEvent::Queued => {
                self.status_message = "Waiting to start...".to_string();
            }
            ConsumerEvent::Running => {
                self.is_downloading = true;
                self.status_message = "Downloading...".to_string();
            }
            ConsumerEvent::Succeeded { message, .. } | ConsumerEvent::Failed { message } => {
                self.is_downloading = false;
                self.status_message = message.clone();
            }
        }
    }

    pub fn view(&self) -> String {
        self.status_message.clone()
    }
}
