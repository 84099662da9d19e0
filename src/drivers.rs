//! Downstream collaborators: volume sinks and media-key targets.
//!
//! All methods take `&self` to support `Arc<dyn …>`; implementations use
//! interior mutability for any state they keep.

use anyhow::Result;
use async_trait::async_trait;

pub mod console;

pub use console::ConsoleDriver;

/// Media command forwarded fire-and-forget to the platform player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    Stop,
}

impl MediaKey {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayPause => "play-pause",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Stop => "stop",
        }
    }
}

/// A backend that can set the volume of a named target.
#[async_trait]
pub trait VolumeSink: Send + Sync {
    /// Driver name (e.g. "console", "pulse", "wasapi").
    fn name(&self) -> &str;

    /// Set `target` to `percent` (0.0-100.0, two-decimal precision).
    async fn set_volume(&self, target: &str, percent: f32) -> Result<()>;

    /// Shut the driver down gracefully.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// A backend that accepts media-key notifications.
#[async_trait]
pub trait MediaControl: Send + Sync {
    fn name(&self) -> &str;

    async fn media_key(&self, key: MediaKey) -> Result<()>;
}
