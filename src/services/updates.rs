use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use super::CommandHandler;
use crate::adapters::{TelegramClient, Update};

/// Server-side hold time of one getUpdates call
const LONG_POLL_SECS: u64 = 30;
const ERROR_BACKOFF_SECS: u64 = 5;

/// Offset that acknowledges every update in `batch`
pub fn next_offset(current: Option<i64>, batch: &[Update]) -> Option<i64> {
    batch
        .iter()
        .map(|u| u.update_id + 1)
        .max()
        .max(current)
}

/// Long-poll getUpdates and feed commands to the handler until shutdown
pub async fn run_polling(
    client: TelegramClient,
    handler: Arc<CommandHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Receiving commands by long polling");
    let mut offset = None;

    loop {
        let batch = tokio::select! {
            batch = client.get_updates(offset, LONG_POLL_SECS) => batch,
            _ = shutdown.changed() => break,
        };

        match batch {
            Ok(updates) => {
                offset = next_offset(offset, &updates);
                for update in &updates {
                    handler.handle_update(update).await;
                }
            }
            Err(e) => {
                let wait = e.retry_after().unwrap_or(ERROR_BACKOFF_SECS);
                warn!(retry_in_secs = wait, "getUpdates failed: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }

    info!("Command polling stopped");
}
