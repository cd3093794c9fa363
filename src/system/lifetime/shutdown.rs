use std::time::Duration;

use tokio::time::timeout;
use tracing::{error, info};

use crate::errors::{Result, ShortenerError};
use crate::services::ShorteningService;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Drains pending retirements and closes the store, bounded by
/// [`SHUTDOWN_TIMEOUT_SECS`].
pub async fn graceful_shutdown(service: &ShorteningService) -> Result<()> {
    let pending = service.deletion_stats().pending();
    if pending > 0 {
        info!("Waiting for {} pending retirement batch(es)", pending);
    }

    match timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), service.shutdown()).await {
        Ok(Ok(())) => {
            info!("Shutdown completed");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Error during shutdown: {}", e);
            Err(e)
        }
        Err(_) => {
            error!(
                "Shutdown timed out after {} seconds",
                SHUTDOWN_TIMEOUT_SECS
            );
            Err(ShortenerError::timeout(format!(
                "Shutdown exceeded {} seconds",
                SHUTDOWN_TIMEOUT_SECS
            )))
        }
    }
}
