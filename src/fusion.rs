//! Fusion & throttling (C4): merges raw face/object/environment signals into
//! alert candidates, then applies a per-`(session, kind)` cooldown so a
//! sustained condition (e.g. a phone held in frame for ten seconds) produces
//! one alert per cooldown window instead of one per captured frame.
//!
//! Repeat firings of the same kind within a session escalate severity past a
//! configurable threshold (§4.4: "PhoneDetected after N repeats becomes
//! Critical").

use std::collections::HashMap;

use crate::{AlertKind, Severity};

const DEFAULT_ESCALATION_REPEAT_COUNT: u32 = 3;

#[derive(Default)]
struct KindState {
    last_fired_ms: Option<u64>,
    repeat_count: u32,
}

/// Per-session throttling state. One `Throttler` instance is created per
/// active session by the session supervisor (C9).
pub struct Throttler {
    cooldowns_ms: HashMap<AlertKind, u64>,
    escalation_repeat_count: u32,
    state: HashMap<AlertKind, KindState>,
}

/// A throttling decision: either the candidate is suppressed (still within
/// its cooldown window) or it fires with a possibly-escalated severity.
#[derive(Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    Suppressed,
    Fire { severity: Severity, repeat_count: u32 },
}

impl Throttler {
    pub fn new() -> Self {
        Self {
            cooldowns_ms: HashMap::new(),
            escalation_repeat_count: DEFAULT_ESCALATION_REPEAT_COUNT,
            state: HashMap::new(),
        }
    }

    pub fn with_escalation_repeat_count(mut self, count: u32) -> Self {
        self.escalation_repeat_count = count.max(1);
        self
    }

    pub fn with_cooldown_ms(mut self, kind: AlertKind, cooldown_ms: u64) -> Self {
        self.cooldowns_ms.insert(kind, cooldown_ms);
        self
    }

    fn cooldown_for(&self, kind: AlertKind) -> u64 {
        self.cooldowns_ms
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_cooldown_ms())
    }

    /// Evaluates whether a freshly observed condition of `kind` should
    /// produce an alert at `now_ms`. Call only when the underlying signal is
    /// actually present (e.g. "phone still in frame"); absence of the
    /// condition should not call this at all, which naturally lets the
    /// cooldown lapse and the next occurrence re-fire as a fresh event.
    pub fn evaluate(&mut self, kind: AlertKind, now_ms: u64) -> ThrottleDecision {
        let cooldown = self.cooldown_for(kind);
        let entry = self.state.entry(kind).or_default();

        let within_cooldown = entry
            .last_fired_ms
            .map(|last| now_ms.saturating_sub(last) < cooldown)
            .unwrap_or(false);

        if within_cooldown {
            return ThrottleDecision::Suppressed;
        }

        entry.last_fired_ms = Some(now_ms);
        entry.repeat_count += 1;

        let severity = if entry.repeat_count >= self.escalation_repeat_count {
            Severity::Critical
        } else {
            kind.base_severity()
        };

        ThrottleDecision::Fire {
            severity,
            repeat_count: entry.repeat_count,
        }
    }

    pub fn repeat_count(&self, kind: AlertKind) -> u32 {
        self.state.get(&kind).map(|s| s.repeat_count).unwrap_or(0)
    }
}

impl Default for Throttler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_cooldown_then_fires_again_after() {
        let mut throttler = Throttler::new().with_cooldown_ms(AlertKind::PhoneDetected, 1_000);
        assert!(matches!(
            throttler.evaluate(AlertKind::PhoneDetected, 0),
            ThrottleDecision::Fire { repeat_count: 1, .. }
        ));
        assert_eq!(throttler.evaluate(AlertKind::PhoneDetected, 500), ThrottleDecision::Suppressed);
        assert!(matches!(
            throttler.evaluate(AlertKind::PhoneDetected, 1_001),
            ThrottleDecision::Fire { repeat_count: 2, .. }
        ));
    }

    #[test]
    fn escalates_severity_after_repeat_threshold() {
        let mut throttler = Throttler::new()
            .with_cooldown_ms(AlertKind::PhoneDetected, 0)
            .with_escalation_repeat_count(3);

        let first = throttler.evaluate(AlertKind::PhoneDetected, 0);
        assert_eq!(first, ThrottleDecision::Fire { severity: AlertKind::PhoneDetected.base_severity(), repeat_count: 1 });
        throttler.evaluate(AlertKind::PhoneDetected, 1);
        let third = throttler.evaluate(AlertKind::PhoneDetected, 2);
        assert_eq!(third, ThrottleDecision::Fire { severity: Severity::Critical, repeat_count: 3 });
    }

    #[test]
    fn kinds_are_independent() {
        let mut throttler = Throttler::new().with_cooldown_ms(AlertKind::PhoneDetected, 10_000);
        throttler.evaluate(AlertKind::PhoneDetected, 0);
        assert!(matches!(
            throttler.evaluate(AlertKind::TabSwitch, 1),
            ThrottleDecision::Fire { repeat_count: 1, .. }
        ));
    }
}
