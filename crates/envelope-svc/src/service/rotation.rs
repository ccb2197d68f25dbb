//! Optional background key rotation.

use std::{sync::Arc, time::Duration};

use tokio::time;
use tracing::{info, warn};

use super::EncryptionService;

/// Spawn a background task that calls [`EncryptionService::rotate_keys`] every
/// `interval`.
///
/// The first rotation fires after one full interval. On failure the previous
/// version stays current and a warning is emitted.
pub fn rotation_task(service: Arc<EncryptionService>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately — skip it so startup keeps its version.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.rotate_keys() {
                Ok(version) => info!(key_version = %version, "scheduled key rotation complete"),
                Err(e) => warn!(error = %e, "scheduled key rotation failed; retaining previous version"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceOptions;

    #[tokio::test(start_paused = true)]
    async fn rotates_on_each_tick() {
        let service = Arc::new(EncryptionService::new(ServiceOptions::for_tests()));
        service.initialize(Some(&[5u8; 32][..])).unwrap();
        let before = service.current_key_version().unwrap();

        let handle = rotation_task(Arc::clone(&service), Duration::from_secs(60));
        time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let after = service.current_key_version().unwrap();
        assert_ne!(before, after);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rotation_keeps_task_alive() {
        let service = Arc::new(EncryptionService::new(ServiceOptions::for_tests()));
        let handle = rotation_task(Arc::clone(&service), Duration::from_secs(1));
        time::sleep(Duration::from_secs(3)).await;
        assert!(!handle.is_finished());
        assert!(service.current_key_version().is_none());
        handle.abort();
    }
}
