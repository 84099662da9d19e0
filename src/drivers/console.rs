//! Console driver - logs all actions for testing and debugging
//!
//! Useful for validating slider→target routing without touching a real
//! mixer, and as the default sink on platforms with no native backend.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::drivers::{MediaControl, MediaKey, VolumeSink};

/// Logs every volume and media action instead of executing it.
pub struct ConsoleDriver {
    name: String,
    /// Execution counter for debugging
    execution_count: Arc<RwLock<u64>>,
}

impl ConsoleDriver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution_count: Arc::new(RwLock::new(0)),
        }
    }

    async fn bump(&self) -> u64 {
        let mut count = self.execution_count.write().await;
        *count += 1;
        *count
    }
}

#[async_trait]
impl VolumeSink for ConsoleDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_volume(&self, target: &str, percent: f32) -> Result<()> {
        let exec_num = self.bump().await;

        info!(
            "🔊 [{}] {} → {:.2}% [exec #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            target,
            percent,
            exec_num
        );

        debug!(
            driver = self.name,
            target = target,
            percent = percent,
            exec_count = exec_num,
            "ConsoleDriver set_volume"
        );

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let final_count = *self.execution_count.read().await;
        info!(
            "🛑 ConsoleDriver '{}' shutting down (executed {} actions)",
            self.name, final_count
        );
        Ok(())
    }
}

#[async_trait]
impl MediaControl for ConsoleDriver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn media_key(&self, key: MediaKey) -> Result<()> {
        let exec_num = self.bump().await;
        info!("🎵 Media key: {} [exec #{}]", key.name(), exec_num);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_volume_executions() {
        let driver = ConsoleDriver::new("test");
        assert_eq!(VolumeSink::name(&driver), "test");

        driver.set_volume("firefox", 48.88).await.unwrap();
        driver.set_volume("master", 100.0).await.unwrap();

        assert_eq!(*driver.execution_count.read().await, 2);
    }

    #[tokio::test]
    async fn media_keys_share_the_counter() {
        let driver = ConsoleDriver::new("test");

        driver.media_key(MediaKey::PlayPause).await.unwrap();
        driver.media_key(MediaKey::Stop).await.unwrap();
        driver.set_volume("master", 0.0).await.unwrap();

        assert_eq!(*driver.execution_count.read().await, 3);
    }
}
