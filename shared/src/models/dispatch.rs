//! Dispatch bookkeeping carried on the order
//!
//! A wave is ephemeral: the only durable trace is this struct. Whether a wave
//! has timed out is recomputed from `wave_started_at`, so no timer state
//! needs to survive a restart.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase tag attached to a wave and to every offer sent in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPhase {
    /// Wave 1, tight radius
    Priority,
    /// Wave 2, expanded radius minus wave-1 couriers
    Expanded,
    /// Wave 1 had nobody in range, expanded radius broadcast straight away
    Immediate,
}

impl DispatchPhase {
    /// No wave follows this one
    pub fn is_last(&self) -> bool {
        !matches!(self, DispatchPhase::Priority)
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchPhase::Priority => write!(f, "priority"),
            DispatchPhase::Expanded => write!(f, "expanded"),
            DispatchPhase::Immediate => write!(f, "immediate"),
        }
    }
}

/// Dispatch state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Never dispatched
    #[default]
    Idle,
    /// A wave is in flight (see `phase`)
    Active,
    Assigned,
    /// All waves finished without an acceptance; eligible for manual resend
    Exhausted,
    /// Order was cancelled or rejected
    Voided,
}

/// Per-order dispatch bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchState {
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<DispatchPhase>,
    /// Monotonic wave counter; timers carry it to detect staleness
    #[serde(default)]
    pub wave: u32,
    /// Couriers offered the order in the current wave, nearest first
    #[serde(default)]
    pub notified: Vec<String>,
    /// Couriers who rejected in the current wave
    #[serde(default)]
    pub rejected: Vec<String>,
    /// Couriers notified in earlier waves of this dispatch round
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_started_at: Option<i64>,
}

impl DispatchState {
    pub fn is_active(&self) -> bool {
        self.status == DispatchStatus::Active
    }

    /// Offered in the current wave or an earlier one of this round
    pub fn was_offered(&self, courier_id: &str) -> bool {
        self.notified.iter().any(|c| c == courier_id)
            || self.excluded.iter().any(|c| c == courier_id)
    }

    /// Every courier of the current wave has rejected
    pub fn all_rejected(&self) -> bool {
        !self.notified.is_empty()
            && self
                .notified
                .iter()
                .all(|c| self.rejected.iter().any(|r| r == c))
    }

    /// Every courier reached in this round
    pub fn everyone_offered(&self) -> Vec<String> {
        let mut all = self.excluded.clone();
        for c in &self.notified {
            if !all.contains(c) {
                all.push(c.clone());
            }
        }
        all
    }

    /// Milliseconds left in the current wave at `now`, 0 once elapsed
    pub fn remaining_ms(&self, now: i64, wave_timeout_ms: i64) -> i64 {
        match self.wave_started_at {
            Some(started) if self.is_active() => (started + wave_timeout_ms - now).max(0),
            _ => 0,
        }
    }
}
