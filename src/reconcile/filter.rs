//! Smoothing and hysteresis for per-channel transitions.
//!
//! Pure per-channel decision logic. The reconciler owns the cooldown
//! counter and decrements it once per cycle; this module only reports
//! whether a channel wants the cooldown armed.

/// Deltas below this are treated as sensor noise and never committed.
pub const NOISE_FLOOR: u16 = 3;

/// Readings this close to the rail right after a flip are suspect.
pub const RAIL_GUARD: u16 = 5;

/// Cycles of suppression after a suspected transient near the rail.
pub const COOLDOWN_CYCLES: u8 = 5;

/// Direction a channel's committed value moved this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Decreased,
    Unchanged,
    Increased,
}

/// Rate-limiting settings, taken from the active configuration each cycle.
#[derive(Debug, Clone, Copy)]
pub struct Smoothing {
    /// Maximum permitted per-cycle change, in raw units (1..=1024).
    pub bound: u16,
    pub enabled: bool,
}

/// Outcome of one per-channel filter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub value: u16,
    pub marker: Delta,
    /// Channel saw a suspected rail transient; arm the cooldown.
    pub arm_cooldown: bool,
}

fn unchanged(committed: u16) -> Step {
    Step {
        value: committed,
        marker: Delta::Unchanged,
        arm_cooldown: false,
    }
}

fn direction(candidate: u16, committed: u16) -> Delta {
    match candidate.cmp(&committed) {
        std::cmp::Ordering::Greater => Delta::Increased,
        std::cmp::Ordering::Less => Delta::Decreased,
        std::cmp::Ordering::Equal => Delta::Unchanged,
    }
}

/// Filter one channel: candidate reading vs last committed value.
///
/// `change_all` forces a full republish: the noise floor, rail guard and
/// ramp are all bypassed and an unmoved channel is marked `Increased` so
/// downstream targets are re-driven.
///
/// `rail_guard` is lowered by the reconciler for the cycle on which a
/// cooldown expires: a delta that survived the whole suppression window
/// was no transient and must be allowed through, otherwise a slider
/// parked at the rail (the mute gesture) could never commit.
pub fn step(
    candidate: u16,
    committed: u16,
    smoothing: Smoothing,
    change_all: bool,
    in_cooldown: bool,
    rail_guard: bool,
) -> Step {
    if change_all {
        let marker = match direction(candidate, committed) {
            Delta::Unchanged => Delta::Increased,
            moved => moved,
        };
        return Step {
            value: candidate,
            marker,
            arm_cooldown: false,
        };
    }

    if in_cooldown {
        return unchanged(committed);
    }

    let delta = candidate.abs_diff(committed);
    if delta < NOISE_FLOOR {
        return unchanged(committed);
    }

    if rail_guard && (candidate < RAIL_GUARD || committed < RAIL_GUARD) {
        // A lever flipped across the rail reads intermediate garbage for a
        // few frames; hold everything until the deck settles.
        return Step {
            value: committed,
            marker: Delta::Unchanged,
            arm_cooldown: true,
        };
    }

    if smoothing.enabled && delta > smoothing.bound {
        let value = if candidate > committed {
            committed + smoothing.bound
        } else {
            committed - smoothing.bound
        };
        return Step {
            value,
            marker: direction(candidate, committed),
            arm_cooldown: false,
        };
    }

    Step {
        value: candidate,
        marker: direction(candidate, committed),
        arm_cooldown: false,
    }
}
