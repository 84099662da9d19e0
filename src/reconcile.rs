//! Slider-state reconciliation engine.
//!
//! Turns raw, noisy per-channel readings into a stable, rate-limited,
//! override-aware volume vector plus a per-channel change directive. One
//! [`Reconciler`] owns all mutable state (committed vector, cooldown,
//! override records); remote contexts feed overrides in through an
//! [`OverrideHandle`] queue drained exactly once per cycle.

mod filter;
mod overrides;
mod sequencer;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::MAX_RAW;
use overrides::OverrideTracker;

pub use filter::{Delta, Smoothing, COOLDOWN_CYCLES, NOISE_FLOOR};

/// Per-cycle settings snapshot, derived from the active configuration so
/// hot reloads take effect on the next cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub slider_count: usize,
    pub smoothing: Smoothing,
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The channel vector was (re)initialized; treat as a full resync.
    Resynced { committed: Vec<u16> },
    /// At least one channel moved.
    Updated {
        markers: Vec<Delta>,
        committed: Vec<u16>,
        /// Live device positions (may diverge from `committed` under an
        /// override or while ramping).
        raw: Vec<u16>,
        overridden: Vec<bool>,
    },
    /// Nothing moved; no downstream action required.
    NoChange,
}

/// Errors rejected at the override interface boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("slider index {index} out of range (deck has {count} sliders)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("value {value} outside the 0-{max} reading domain", max = MAX_RAW)]
    ValueOutOfRange { value: u16 },
    #[error("reconciler is no longer running")]
    Closed,
}

struct OverrideRequest {
    channel: usize,
    value: u16,
}

/// Cloneable handle for submitting overrides from outside the loop.
#[derive(Clone)]
pub struct OverrideHandle {
    tx: mpsc::UnboundedSender<OverrideRequest>,
    slider_count: Arc<AtomicUsize>,
}

impl OverrideHandle {
    /// Pin `channel` to `value` at the next reconciliation cycle.
    pub fn add_override(&self, channel: usize, value: u16) -> Result<(), OverrideError> {
        let count = self.slider_count.load(Ordering::Relaxed);
        if channel >= count {
            return Err(OverrideError::IndexOutOfRange {
                index: channel,
                count,
            });
        }
        if value > MAX_RAW {
            return Err(OverrideError::ValueOutOfRange { value });
        }
        self.tx
            .send(OverrideRequest { channel, value })
            .map_err(|_| OverrideError::Closed)
    }
}

/// The stateful reconciliation engine; one instance per deck.
pub struct Reconciler {
    committed: Vec<u16>,
    /// Last raw frame from the device.
    actual: Vec<u16>,
    cooldown: u8,
    change_all: bool,
    overrides: OverrideTracker,
    rx: mpsc::UnboundedReceiver<OverrideRequest>,
    slider_count: Arc<AtomicUsize>,
    holding: bool,
}

impl Reconciler {
    pub fn new(slider_count: usize) -> (Self, OverrideHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared_count = Arc::new(AtomicUsize::new(slider_count));
        let reconciler = Self {
            committed: Vec::new(),
            actual: Vec::new(),
            cooldown: 0,
            change_all: false,
            overrides: OverrideTracker::new(slider_count),
            rx,
            slider_count: shared_count.clone(),
            holding: false,
        };
        let handle = OverrideHandle {
            tx,
            slider_count: shared_count,
        };
        (reconciler, handle)
    }

    /// Committed volume vector (empty before the first valid reading).
    pub fn committed(&self) -> &[u16] {
        &self.committed
    }

    /// Per-channel "override active" flags.
    pub fn override_flags(&self) -> Vec<bool> {
        self.overrides.active_flags()
    }

    /// Whether the last cycle deferred an override-driven increase.
    pub fn holding_increases(&self) -> bool {
        self.holding
    }

    /// Run one reconciliation cycle over a raw frame.
    pub fn cycle(&mut self, raw: &[u16], settings: &CycleSettings) -> CycleOutcome {
        self.slider_count
            .store(settings.slider_count, Ordering::Relaxed);
        self.drain_submissions(settings.slider_count);

        if self.committed.is_empty() {
            return if raw.len() == settings.slider_count {
                self.adopt(raw.to_vec())
            } else {
                warn!(
                    "First frame has {} fields but {} sliders are configured",
                    raw.len(),
                    settings.slider_count
                );
                self.resync_zeroed(settings.slider_count)
            };
        }

        if raw.len() != self.committed.len() || self.committed.len() != settings.slider_count {
            debug!(
                "Frame length changed ({} -> {}), reinitializing",
                self.committed.len(),
                raw.len()
            );
            return self.resync_zeroed(settings.slider_count);
        }

        let change_all = std::mem::take(&mut self.change_all);
        // The counter is decremented once per cycle, not per channel. On
        // the cycle it expires the rail guard stands down: a delta that
        // outlived the whole window was no transient.
        let (in_cooldown, just_served) = if self.cooldown > 0 {
            self.cooldown -= 1;
            (self.cooldown > 0, self.cooldown == 0)
        } else {
            (false, false)
        };

        let len = self.committed.len();
        let prior = self.committed.clone();
        let mut values = Vec::with_capacity(len);
        let mut markers = Vec::with_capacity(len);
        let mut arm_cooldown = false;

        for i in 0..len {
            // A full republish replays committed values; override release
            // and pinning only make sense against real device data.
            if !change_all {
                if self.overrides.release_if_moved(i, raw[i]) {
                    debug!("Slider {i} moved, releasing manual override");
                }
                if let Some(pin) = self.overrides.pin(i) {
                    values.push(pin);
                    markers.push(Delta::Unchanged);
                    continue;
                }
            }

            let step = filter::step(
                raw[i],
                prior[i],
                settings.smoothing,
                change_all,
                in_cooldown,
                !just_served,
            );
            arm_cooldown |= step.arm_cooldown;
            values.push(step.value);
            markers.push(step.marker);
        }

        if arm_cooldown {
            self.cooldown = COOLDOWN_CYCLES;
        }

        // Apply pending pins; they take precedence over whatever the
        // filter decided for the channel this cycle.
        let mut override_driven = vec![false; len];
        for i in 0..len {
            if let Some(pin) = self.overrides.take_pending(i) {
                let marker = match pin.cmp(&prior[i]) {
                    std::cmp::Ordering::Greater => Delta::Increased,
                    std::cmp::Ordering::Less => Delta::Decreased,
                    std::cmp::Ordering::Equal => Delta::Unchanged,
                };
                values[i] = pin;
                markers[i] = marker;
                self.overrides.apply(i, pin, raw[i]);
                override_driven[i] = marker == Delta::Increased;
            }
        }

        let holds = sequencer::plan_holds(&markers, &override_driven);
        self.holding = false;
        for i in 0..len {
            if holds[i] {
                values[i] = prior[i];
                markers[i] = Delta::Unchanged;
                self.overrides.defer(i);
                self.holding = true;
            }
        }

        self.committed = values;
        if !change_all {
            self.actual = raw.to_vec();
        }

        self.publish(markers)
    }

    /// Republish every channel from the existing vector, without waiting
    /// for new transport data (preset change with update enabled).
    pub fn force_republish(&mut self, settings: &CycleSettings) -> CycleOutcome {
        if self.committed.is_empty() {
            return CycleOutcome::NoChange;
        }
        self.change_all = true;
        let frame = self.committed.clone();
        self.cycle(&frame, settings)
    }

    fn drain_submissions(&mut self, slider_count: usize) {
        while let Ok(req) = self.rx.try_recv() {
            if req.channel >= slider_count {
                // The handle validates, but the deck may have shrunk since.
                warn!(
                    "Dropping override for slider {} (deck has {})",
                    req.channel, slider_count
                );
                continue;
            }
            self.overrides.submit(req.channel, req.value);
        }
    }

    fn adopt(&mut self, frame: Vec<u16>) -> CycleOutcome {
        self.actual = frame.clone();
        self.committed = frame;
        self.overrides.reset(self.committed.len());
        self.cooldown = 0;
        self.change_all = false;
        self.holding = false;
        CycleOutcome::Resynced {
            committed: self.committed.clone(),
        }
    }

    fn resync_zeroed(&mut self, slider_count: usize) -> CycleOutcome {
        self.adopt(vec![0; slider_count])
    }

    fn publish(&self, markers: Vec<Delta>) -> CycleOutcome {
        if markers.iter().all(|m| *m == Delta::Unchanged) {
            return CycleOutcome::NoChange;
        }
        CycleOutcome::Updated {
            markers,
            committed: self.committed.clone(),
            raw: self.actual.clone(),
            overridden: self.overrides.active_flags(),
        }
    }
}
