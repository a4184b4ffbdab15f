pub mod commands;
pub mod format;
pub mod log_throttle;
pub mod metrics;
pub mod publisher;
pub mod scheduler;
pub mod updates;
pub mod webhook;

pub use commands::{Command, CommandHandler};
pub use log_throttle::ErrorThrottle;
pub use metrics::{Metrics, MetricsSnapshot};
pub use publisher::{FinalReceipt, Publisher};
pub use scheduler::Scheduler;
pub use updates::run_polling;
pub use webhook::{router, WebhookServer, WebhookState, WEBHOOK_PATH};
