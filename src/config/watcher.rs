//! Configuration file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::DeckConfig;

/// Watches the config file and emits reloaded configs on change.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<DeckConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for an existing config file.
    pub fn new(config_path: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10);

        // notify callbacks run on their own OS thread, not in Tokio
        // context, so capture the runtime handle up front.
        let runtime_handle = tokio::runtime::Handle::current();
        let watched_path = config_path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        debug!("Config file modified: {:?}", event.paths);

                        let config_path = watched_path.clone();
                        let tx = tx.clone();

                        runtime_handle.spawn(async move {
                            // Debounce: wait for file writes to complete.
                            tokio::time::sleep(Duration::from_millis(100)).await;

                            match DeckConfig::load(&config_path).await {
                                Ok(new_config) => {
                                    info!("Configuration reloaded successfully");
                                    if let Err(e) = tx.send(new_config).await {
                                        error!("Failed to send config update: {}", e);
                                    }
                                }
                                Err(e) => {
                                    warn!("Failed to reload config (keeping old config): {}", e);
                                }
                            }
                        });
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&config_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file: {}", config_path.display()))?;

        info!("Config file watcher started for: {}", config_path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next config update.
    /// Returns None if the watcher has been closed.
    pub async fn next_config(&mut self) -> Option<DeckConfig> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn reloads_on_modification() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");

        let initial = DeckConfig::default();
        initial.save(&config_path).await?;

        let mut watcher = ConfigWatcher::new(config_path.clone())?;

        let mut modified = initial.clone();
        modified.smoothness = 123;
        tokio::time::sleep(Duration::from_millis(100)).await;
        modified.save(&config_path).await?;

        let reloaded =
            tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        if let Some(new_config) = reloaded {
            assert_eq!(new_config.smoothness, 123);
        }

        Ok(())
    }

    #[tokio::test]
    async fn keeps_old_config_when_file_breaks() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.yaml");

        DeckConfig::default().save(&config_path).await?;
        let mut watcher = ConfigWatcher::new(config_path.clone())?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::fs::write(&config_path, "::: broken :::").await?;

        // No update should arrive; the old config stays in effect.
        let result =
            tokio::time::timeout(Duration::from_millis(500), watcher.next_config()).await;
        assert!(result.is_err());

        Ok(())
    }
}
