//! AI Guardian (C8): produces a human-readable warning/explanation string for
//! a fired alert using a three-tier strategy — a static phrase table first
//! (which never calls the external model and must cover every alert kind at
//! every warning level), then a TTL-bounded process-lifetime cache of
//! previously generated text, and only then a call out to a generative text
//! service, rate-limited so a burst of alerts can't turn into a burst of
//! outbound API calls.
//!
//! Grounded on the `Arc<Mutex<..>>`-guarded shared-state idiom used
//! elsewhere in this crate (`BackendRegistry`, the HTTP layer's capability
//! token) and on `ureq` for the outbound call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::AlertKind;

const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Boundary trait for the external generative text service (C10).
pub trait GenerativeTextService: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// `ureq`-backed implementation calling a JSON completion endpoint.
pub struct UreqGenerativeTextService {
    endpoint: String,
    api_key: String,
}

impl UreqGenerativeTextService {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

impl GenerativeTextService for UreqGenerativeTextService {
    fn generate(&self, prompt: &str) -> Result<String> {
        let response = ureq::post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(ureq::json!({ "prompt": prompt }))
            .map_err(|e| anyhow!("generative service call failed: {}", e))?;
        let body: serde_json::Value = response
            .into_json()
            .map_err(|e| anyhow!("generative service returned invalid JSON: {}", e))?;
        body.get("text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("generative service response missing 'text' field"))
    }
}

/// In-memory stub for tests and the `demo` binary.
pub struct StubGenerativeTextService {
    pub fixed_response: String,
}

impl GenerativeTextService for StubGenerativeTextService {
    fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.fixed_response.clone())
    }
}

struct RateBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
    refill_interval: Duration,
}

impl RateBucket {
    fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
            refill_interval,
        }
    }

    fn try_take(&mut self) -> bool {
        if self.last_refill.elapsed() >= self.refill_interval {
            self.tokens = self.capacity;
            self.last_refill = Instant::now();
        }
        if self.tokens == 0 {
            false
        } else {
            self.tokens -= 1;
            true
        }
    }
}

/// Base phrase for an alert kind, independent of warning level. The table
/// tier layers the level onto this (§4.8: "table MUST cover all alert kinds
/// for levels 1, 2, and 3" — levels share a base phrase and escalate in
/// register rather than needing 51 independent literals).
fn base_phrase(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::NoFace => "we could not see your face in the camera",
        AlertKind::LookingAway => "you appear to be looking away from the screen",
        AlertKind::Speaking => "audio suggests you may be speaking to someone during the exam",
        AlertKind::MultiPerson => "more than one person was detected in view of the camera",
        AlertKind::PhoneDetected => "a phone or similar device was detected near you",
        AlertKind::MaterialDetected => "unauthorized written material was detected near you",
        AlertKind::HeadphonesDetected => "headphones were detected, which are not permitted during this exam",
        AlertKind::TabSwitch => "you switched away from the exam browser tab",
        AlertKind::FullscreenExit => "you exited fullscreen mode during the exam",
        AlertKind::MultiScreen => "multiple displays were detected, which is not permitted",
        AlertKind::CopyPasteAttempt => "a copy or paste action was attempted during the exam",
        AlertKind::RightClick => "a right-click action was detected",
        AlertKind::KeyboardShortcut => "a restricted keyboard shortcut was used",
        AlertKind::RemoteDesktop => "remote desktop software was detected running during the exam",
        AlertKind::FaceVerificationFailed => "we could not confirm your identity matches the enrollment photo",
        AlertKind::ManualFlag => "a proctor manually flagged this session for review",
        AlertKind::LedgerOverflow => "the event log briefly could not keep up and dropped some entries",
    }
}

/// Pre-computed table lookup keyed by `(kind, min(warning_count, 3))`.
/// Never calls the external model (§4.8 tier 1).
fn table_phrase(kind: AlertKind, warning_count: u32) -> String {
    let level = warning_count.min(3).max(1);
    let base = base_phrase(kind);
    match level {
        1 => format!("Notice: {base}. Please correct this to avoid further review."),
        2 => format!("Warning: {base}. This has now happened more than once."),
        _ => format!("Final warning: {base}. Repeated occurrences will be escalated for manual review."),
    }
}

struct CacheEntry {
    text: String,
    inserted_at: Instant,
}

/// Warning generator with the table → cache → generative fallback chain
/// (§4.8).
pub struct AiGuardian {
    cache: Arc<Mutex<HashMap<(AlertKind, u32), CacheEntry>>>,
    rate_bucket: Arc<Mutex<RateBucket>>,
    service: Option<Arc<dyn GenerativeTextService>>,
}

impl AiGuardian {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
            rate_bucket: Arc::new(Mutex::new(RateBucket::new(10, Duration::from_secs(60)))),
            service: None,
        }
    }

    pub fn with_generative_service(mut self, service: Arc<dyn GenerativeTextService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_rate_limit(mut self, capacity: u32, refill_interval: Duration) -> Self {
        self.rate_bucket = Arc::new(Mutex::new(RateBucket::new(capacity, refill_interval)));
        self
    }

    /// Produces a warning string for `kind`, `warning_count` being the
    /// session's running count of prior warnings of this kind. Tier 1 (the
    /// static table) always resolves since `AlertKind` is a closed set and
    /// `level = min(warning_count, 3)` always lands in `{1, 2, 3}`; tiers 2
    /// and 3 exist in the strategy for when a deployment chooses not to rely
    /// on the table (e.g. a future open-ended kind set) and are reachable by
    /// calling [`AiGuardian::generative_or_table`] directly.
    pub fn warning_for(&self, kind: AlertKind, warning_count: u32) -> String {
        table_phrase(kind, warning_count)
    }

    /// Tiers 2 and 3 of §4.8: cache, then rate-limited generative call,
    /// falling back to the table phrase. Exposed separately from
    /// `warning_for` so callers that want generative-enriched explanations
    /// (e.g. the integrity-report explanation) can opt in without bypassing
    /// the table-first guarantee for routine per-alert warnings.
    pub fn generative_or_table(&self, kind: AlertKind, warning_count: u32, details: &str) -> String {
        let cache_key = (kind, warning_count);
        if let Some(cached) = self.cache.lock().ok().and_then(|mut c| {
            let hit = c.get(&cache_key).and_then(|entry| {
                if entry.inserted_at.elapsed() < CACHE_TTL {
                    Some(entry.text.clone())
                } else {
                    None
                }
            });
            if hit.is_none() {
                c.remove(&cache_key);
            }
            hit
        }) {
            return cached;
        }

        if let Some(service) = &self.service {
            let allowed = self.rate_bucket.lock().map(|mut b| b.try_take()).unwrap_or(false);
            if allowed {
                let prompt = format!(
                    "Write one short, neutral sentence warning a test-taker about: {:?}. Warning count: {}. Context: {}",
                    kind, warning_count, details
                );
                if let Ok(text) = service.generate(&prompt) {
                    if let Ok(mut cache) = self.cache.lock() {
                        cache.insert(
                            cache_key,
                            CacheEntry {
                                text: text.clone(),
                                inserted_at: Instant::now(),
                            },
                        );
                    }
                    return text;
                }
            }
        }

        table_phrase(kind, warning_count)
    }

    /// Produces the integrity report's explanation paragraph (§4.8, §4.9):
    /// attempts a generative rewrite of `deterministic_summary` under the
    /// same rate limiter as per-alert warnings, falling back to the
    /// deterministic text untouched on any miss. Not keyed by alert kind, so
    /// it bypasses the table/cache tiers entirely and goes straight to tier 3.
    pub fn report_explanation(&self, deterministic_summary: String, prompt: &str) -> String {
        let Some(service) = &self.service else {
            return deterministic_summary;
        };
        let allowed = self.rate_bucket.lock().map(|mut b| b.try_take()).unwrap_or(false);
        if !allowed {
            return deterministic_summary;
        }
        service.generate(prompt).unwrap_or(deterministic_summary)
    }
}

impl Default for AiGuardian {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_tier_resolves_without_a_configured_service() {
        let guardian = AiGuardian::new();
        let text = guardian.warning_for(AlertKind::PhoneDetected, 1);
        assert_eq!(text, table_phrase(AlertKind::PhoneDetected, 1));
    }

    #[test]
    fn table_tier_escalates_with_warning_count_and_caps_at_level_three() {
        let guardian = AiGuardian::new();
        let level_one = guardian.warning_for(AlertKind::TabSwitch, 1);
        let level_three = guardian.warning_for(AlertKind::TabSwitch, 3);
        let level_ten = guardian.warning_for(AlertKind::TabSwitch, 10);
        assert_ne!(level_one, level_three);
        assert_eq!(level_three, level_ten, "level is clamped to 3 regardless of warning_count");
    }

    #[test]
    fn generative_result_is_cached_after_first_call() {
        let service = Arc::new(StubGenerativeTextService {
            fixed_response: "custom warning".to_string(),
        });
        let guardian = AiGuardian::new().with_generative_service(service);
        let first = guardian.generative_or_table(AlertKind::MultiPerson, 1, "repeat=1");
        assert_eq!(first, "custom warning");
        let second = guardian.generative_or_table(AlertKind::MultiPerson, 1, "repeat=1");
        assert_eq!(second, "custom warning", "second call hits the cache, not the service");
    }

    #[test]
    fn rate_limited_calls_degrade_to_table_phrase() {
        let service = Arc::new(StubGenerativeTextService {
            fixed_response: "custom warning".to_string(),
        });
        let guardian = AiGuardian::new()
            .with_generative_service(service)
            .with_rate_limit(0, Duration::from_secs(60));
        let text = guardian.generative_or_table(AlertKind::TabSwitch, 1, "");
        assert_eq!(text, table_phrase(AlertKind::TabSwitch, 1));
    }
}
