//! Manual override tracking.
//!
//! A remote surface can pin a channel to a value. The pin holds until the
//! physical slider reports a genuine movement (beyond the noise floor,
//! relative to where the slider sat when the pin was applied), at which
//! point the device takes precedence again.

use super::filter::NOISE_FLOOR;

#[derive(Debug, Clone, Copy)]
struct Applied {
    value: u16,
    /// Raw device reading at the moment the override was applied.
    device_at_apply: u16,
}

/// Pending and applied override records, one slot per channel.
#[derive(Debug, Default)]
pub(super) struct OverrideTracker {
    pending: Vec<Option<u16>>,
    applied: Vec<Option<Applied>>,
}

impl OverrideTracker {
    pub fn new(len: usize) -> Self {
        Self {
            pending: vec![None; len],
            applied: vec![None; len],
        }
    }

    /// Drop every record and resize to `len` (vector resync).
    pub fn reset(&mut self, len: usize) {
        self.pending = vec![None; len];
        self.applied = vec![None; len];
    }

    /// Queue a pin for `channel`; the latest submission wins.
    pub fn submit(&mut self, channel: usize, value: u16) {
        if let Some(slot) = self.pending.get_mut(channel) {
            *slot = Some(value);
        }
    }

    pub fn has_pending(&self, channel: usize) -> bool {
        self.pending.get(channel).is_some_and(Option::is_some)
    }

    pub fn take_pending(&mut self, channel: usize) -> Option<u16> {
        self.pending.get_mut(channel).and_then(Option::take)
    }

    /// Promote a pending pin to applied, recording the device position.
    pub fn apply(&mut self, channel: usize, value: u16, device_at_apply: u16) {
        if let Some(slot) = self.applied.get_mut(channel) {
            *slot = Some(Applied {
                value,
                device_at_apply,
            });
        }
    }

    /// Push an applied pin back to pending (its commit was deferred).
    pub fn defer(&mut self, channel: usize) {
        if let Some(rec) = self.applied.get_mut(channel).and_then(Option::take) {
            self.pending[channel] = Some(rec.value);
        }
    }

    /// The pinned value for `channel`, if an applied override holds it.
    pub fn pin(&self, channel: usize) -> Option<u16> {
        self.applied.get(channel).copied().flatten().map(|r| r.value)
    }

    /// Release the override if the device genuinely moved; returns whether
    /// a release happened.
    pub fn release_if_moved(&mut self, channel: usize, raw: u16) -> bool {
        let Some(slot) = self.applied.get_mut(channel) else {
            return false;
        };
        let moved = slot
            .as_ref()
            .is_some_and(|rec| raw.abs_diff(rec.device_at_apply) >= NOISE_FLOOR);
        if moved {
            *slot = None;
        }
        moved
    }

    pub fn is_active(&self, channel: usize) -> bool {
        self.applied.get(channel).is_some_and(Option::is_some)
    }

    pub fn active_flags(&self) -> Vec<bool> {
        self.applied.iter().map(Option::is_some).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_pending_submission_wins() {
        let mut t = OverrideTracker::new(2);
        t.submit(0, 100);
        t.submit(0, 900);
        assert_eq!(t.take_pending(0), Some(900));
        assert_eq!(t.take_pending(0), None);
    }

    #[test]
    fn applied_releases_on_genuine_movement_only() {
        let mut t = OverrideTracker::new(1);
        t.apply(0, 800, 500);
        assert!(t.is_active(0));

        // Within the noise floor of where the slider sat: still pinned.
        assert!(!t.release_if_moved(0, 501));
        assert_eq!(t.pin(0), Some(800));

        assert!(t.release_if_moved(0, 503));
        assert!(!t.is_active(0));
        assert_eq!(t.pin(0), None);
    }

    #[test]
    fn defer_moves_applied_back_to_pending() {
        let mut t = OverrideTracker::new(1);
        t.apply(0, 700, 500);
        t.defer(0);
        assert!(!t.is_active(0));
        assert!(t.has_pending(0));
        assert_eq!(t.take_pending(0), Some(700));
    }

    #[test]
    fn out_of_range_submissions_are_ignored() {
        let mut t = OverrideTracker::new(2);
        t.submit(5, 100);
        assert!(!t.has_pending(0));
        assert!(!t.has_pending(1));
    }
}
