pub mod metrics;
pub mod notify;

pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use notify::{Notification, NotificationLevel, Notifier};
