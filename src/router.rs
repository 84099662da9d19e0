//! Router module - per-cycle orchestration of deck records.
//!
//! The Router turns reconciliation outcomes into driver calls: changed
//! channels fan out to the volume targets of the active preset, preset
//! changes rotate and persist the mapping, media tokens are forwarded
//! fire-and-forget. It also maintains the published snapshot and the
//! broadcast stream the remote API serves from.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::DeckConfig;
use crate::drivers::{MediaControl, MediaKey, VolumeSink};
use crate::protocol::{DeckCommand, MAX_RAW};
use crate::reconcile::{CycleOutcome, Delta, Reconciler};

/// Published per-cycle state, served by the API and pushed over SSE.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeckSnapshot {
    /// Committed (reconciled) values.
    pub volume: Vec<u16>,
    /// Live device positions.
    pub actual_volume: Vec<u16>,
    pub override_active: Vec<bool>,
}

/// Map a raw 0-1023 value to a percentage with two-decimal precision.
pub fn percent_of(raw: u16) -> f32 {
    (f32::from(raw) / f32::from(MAX_RAW) * 100.0 * 100.0).round() / 100.0
}

/// Central orchestrator between the reconciler and the drivers.
pub struct Router {
    config: Arc<RwLock<DeckConfig>>,
    config_path: PathBuf,
    sink: Arc<dyn VolumeSink>,
    media: Arc<dyn MediaControl>,
    snapshot: Arc<parking_lot::RwLock<DeckSnapshot>>,
    update_tx: broadcast::Sender<DeckSnapshot>,
}

impl Router {
    pub fn new(
        config: Arc<RwLock<DeckConfig>>,
        config_path: PathBuf,
        sink: Arc<dyn VolumeSink>,
        media: Arc<dyn MediaControl>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(64);
        Self {
            config,
            config_path,
            sink,
            media,
            snapshot: Arc::new(parking_lot::RwLock::new(DeckSnapshot::default())),
            update_tx,
        }
    }

    /// Shared snapshot handle for the API.
    pub fn snapshot_handle(&self) -> Arc<parking_lot::RwLock<DeckSnapshot>> {
        self.snapshot.clone()
    }

    /// Broadcast sender feeding the SSE stream.
    pub fn update_sender(&self) -> broadcast::Sender<DeckSnapshot> {
        self.update_tx.clone()
    }

    /// Run one reconciliation cycle over a numeric frame.
    pub async fn on_readings(&self, reconciler: &mut Reconciler, raw: &[u16]) {
        let settings = self.config.read().await.cycle_settings();
        let outcome = reconciler.cycle(raw, &settings);
        self.apply_outcome(outcome).await;
    }

    /// Handle a command token from the deck.
    pub async fn on_command(&self, reconciler: &mut Reconciler, command: DeckCommand) {
        debug!("Deck command: {}", command.name());
        match command {
            DeckCommand::ChangePreset => self.change_preset(reconciler).await,
            DeckCommand::PlayPause => self.forward_media(MediaKey::PlayPause).await,
            DeckCommand::Next => self.forward_media(MediaKey::Next).await,
            DeckCommand::Previous => self.forward_media(MediaKey::Previous).await,
            DeckCommand::Stop => self.forward_media(MediaKey::Stop).await,
        }
    }

    async fn forward_media(&self, key: MediaKey) {
        if let Err(e) = self.media.media_key(key).await {
            warn!("Media key {} failed: {}", key.name(), e);
        }
    }

    async fn change_preset(&self, reconciler: &mut Reconciler) {
        let (persisted, republish, settings) = {
            let mut config = self.config.write().await;
            let index = config.cycle_preset();
            info!(
                "🎚  Preset changed to '{}' ({})",
                config.active_preset_name(),
                index
            );
            (config.clone(), config.update_after_preset_change, config.cycle_settings())
        };

        if let Err(e) = persisted.save(&self.config_path).await {
            warn!("Failed to persist preset change: {}", e);
        }

        if republish {
            let outcome = reconciler.force_republish(&settings);
            self.apply_outcome(outcome).await;
        }
    }

    /// Fan a cycle outcome out to the volume targets and publish it.
    pub async fn apply_outcome(&self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::NoChange => {}
            CycleOutcome::Resynced { committed } => {
                info!("Full resync over {} channels", committed.len());
                let config = self.config.read().await;
                for (i, &value) in committed.iter().enumerate() {
                    self.apply_channel(&config, i, value).await;
                }
                drop(config);
                let overridden = vec![false; committed.len()];
                self.publish(committed.clone(), committed, overridden);
            }
            CycleOutcome::Updated {
                markers,
                committed,
                raw,
                overridden,
            } => {
                let config = self.config.read().await;
                for (i, marker) in markers.iter().enumerate() {
                    if *marker != Delta::Unchanged {
                        self.apply_channel(&config, i, committed[i]).await;
                    }
                }
                drop(config);
                self.publish(committed, raw, overridden);
            }
        }
    }

    /// Drive every target the active preset maps to `channel`.
    async fn apply_channel(&self, config: &DeckConfig, channel: usize, value: u16) {
        let Some(targets) = config.slider_targets(channel) else {
            // The active preset does not cover this slider.
            debug!("No targets for slider {} in active preset", channel);
            return;
        };

        let percent = percent_of(value);
        for target in targets {
            if let Err(e) = self.sink.set_volume(target, percent).await {
                error!("Failed to set volume of {}: {}", target, e);
            }
        }
    }

    fn publish(&self, volume: Vec<u16>, actual_volume: Vec<u16>, override_active: Vec<bool>) {
        let snapshot = DeckSnapshot {
            volume,
            actual_volume,
            override_active,
        };
        *self.snapshot.write() = snapshot.clone();
        // Best-effort broadcast (no subscribers is fine).
        let _ = self.update_tx.send(snapshot);
    }

    /// Shut down the drivers.
    pub async fn shutdown(&self) -> Result<()> {
        self.sink.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records every set_volume call instead of executing it.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, f32)>>,
    }

    #[async_trait]
    impl VolumeSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn set_volume(&self, target: &str, percent: f32) -> Result<()> {
            self.calls.lock().push((target.to_string(), percent));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingMedia {
        keys: Mutex<Vec<MediaKey>>,
    }

    #[async_trait]
    impl MediaControl for RecordingMedia {
        fn name(&self) -> &str {
            "recording"
        }

        async fn media_key(&self, key: MediaKey) -> Result<()> {
            self.keys.lock().push(key);
            Ok(())
        }
    }

    fn make_router(dir: &TempDir) -> (Router, Arc<RecordingSink>, Arc<RecordingMedia>) {
        let sink = Arc::new(RecordingSink::default());
        let media = Arc::new(RecordingMedia::default());
        let config = Arc::new(RwLock::new(DeckConfig::default()));
        let router = Router::new(
            config,
            dir.path().join("config.yaml"),
            sink.clone(),
            media.clone(),
        );
        (router, sink, media)
    }

    #[test]
    fn percent_mapping_is_two_decimal() {
        assert_eq!(percent_of(0), 0.0);
        assert_eq!(percent_of(1023), 100.0);
        assert_eq!(percent_of(500), 48.88);
    }

    #[tokio::test]
    async fn updated_outcome_drives_only_changed_channels() {
        let dir = TempDir::new().unwrap();
        let (router, sink, _media) = make_router(&dir);

        router
            .apply_outcome(CycleOutcome::Updated {
                markers: vec![Delta::Increased, Delta::Unchanged],
                committed: vec![1023, 500],
                raw: vec![1023, 500],
                overridden: vec![false, false],
            })
            .await;

        let calls = sink.calls.lock().clone();
        // Slider 0 maps to two targets in the default preset.
        assert_eq!(
            calls,
            vec![
                ("firefox".to_string(), 100.0),
                ("chromium".to_string(), 100.0),
            ]
        );
    }

    #[tokio::test]
    async fn uncovered_channels_are_skipped() {
        let dir = TempDir::new().unwrap();
        let (router, sink, _media) = make_router(&dir);

        // Default preset covers two sliders; channels 2 and 3 have no
        // targets and must not error.
        router
            .apply_outcome(CycleOutcome::Updated {
                markers: vec![
                    Delta::Unchanged,
                    Delta::Unchanged,
                    Delta::Increased,
                    Delta::Increased,
                ],
                committed: vec![0, 0, 800, 900],
                raw: vec![0, 0, 800, 900],
                overridden: vec![false; 4],
            })
            .await;

        assert!(sink.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn resync_drives_every_covered_channel() {
        let dir = TempDir::new().unwrap();
        let (router, sink, _media) = make_router(&dir);

        router
            .apply_outcome(CycleOutcome::Resynced {
                committed: vec![512, 512],
            })
            .await;

        let calls = sink.calls.lock().clone();
        assert_eq!(calls.len(), 3); // firefox + chromium + master
        assert!(calls.iter().all(|(_, p)| *p == 50.05));
    }

    #[tokio::test]
    async fn media_tokens_are_forwarded() {
        let dir = TempDir::new().unwrap();
        let (router, _sink, media) = make_router(&dir);
        let (mut reconciler, _handle) = Reconciler::new(4);

        router
            .on_command(&mut reconciler, DeckCommand::PlayPause)
            .await;
        router.on_command(&mut reconciler, DeckCommand::Next).await;

        assert_eq!(
            media.keys.lock().clone(),
            vec![MediaKey::PlayPause, MediaKey::Next]
        );
    }

    #[tokio::test]
    async fn preset_change_persists_and_republishes() {
        let dir = TempDir::new().unwrap();
        let (router, sink, _media) = make_router(&dir);
        let (mut reconciler, _handle) = Reconciler::new(4);

        // Prime the reconciler so a republish has a vector to replay.
        router
            .on_readings(&mut reconciler, &[500, 500, 500, 500])
            .await;
        sink.calls.lock().clear();

        router
            .on_command(&mut reconciler, DeckCommand::ChangePreset)
            .await;

        // Preset "gaming" maps slider 0 -> steam, slider 1 -> master.
        let calls = sink.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("steam".to_string(), 48.88),
                ("master".to_string(), 48.88),
            ]
        );

        // The new index was persisted next to the tempdir config.
        let saved = DeckConfig::load(&dir.path().join("config.yaml"))
            .await
            .unwrap();
        assert_eq!(saved.selected_preset, 1);
    }
}
