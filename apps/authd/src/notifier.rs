use async_trait::async_trait;
use atlascode_core::Notifier;
use tracing::{error, warn};

/// Notifications for a headless host: logged, never answered.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show_warning(&self, message: &str, _actions: &[&str]) -> Option<String> {
        warn!("[Notify] {}", message);
        None
    }

    async fn show_error(&self, message: &str, _actions: &[&str]) -> Option<String> {
        error!("[Notify] {}", message);
        None
    }
}
