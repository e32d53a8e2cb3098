//! Proctoring Kernel
//!
//! This crate implements the core kernel for an online-exam proctoring engine: a
//! soft-realtime pipeline that fuses face-landmark analysis, object detection, and
//! browser-environment signals into a throttled, evidenced event stream, binds a
//! session to an enrolled biometric template, and produces a post-exam integrity
//! report.
//!
//! # Module structure
//!
//! - `frame`: raw media isolation (`RawFrame`, `InferenceView`, `FrameBuffer`).
//! - `camera`: frame-pump camera sources (C1).
//! - `face`: face-landmark analysis (C2).
//! - `detect`: object detection (C3).
//! - `fusion`: alert throttling and counters (C4).
//! - `capture`: evidence snapshot/encode/upload (C5).
//! - `ledger`: append-only session event log (C6).
//! - `verifier`: biometric enrollment and verification (C7).
//! - `guardian`: AI warning/report service (C8).
//! - `supervisor`: session lifecycle state machine (C9).
//! - `api`: HTTP boundary for the session lifecycle interface (C10).
//! - `config`: layered configuration.
//! - `crypto`: ledger hash-chain signing primitives.

use anyhow::{anyhow, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod api;
pub mod camera;
pub mod capture;
pub mod config;
pub mod crypto;
pub mod detect;
pub mod face;
pub mod frame;
pub mod fusion;
pub mod guardian;
pub mod ledger;
pub mod supervisor;
pub mod ui;
pub mod verifier;

pub use config::SessionConfig;
pub use fusion::Throttler;
pub use ledger::{InMemorySessionLedger, SessionLedger, SqliteSessionLedger};
pub use supervisor::SessionSupervisor;

/// Current wall-clock time in whole milliseconds since the epoch.
pub fn now_ms() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// State of a single candidate's single exam attempt.
///
/// Invariant: once state leaves `Active`, no new events or evidence may be
/// appended to that session's ledger (enforced by [`SessionLedger::append`]).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Active,
    Submitted,
    AutoSubmitted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Submitted | SessionState::AutoSubmitted)
    }
}

/// Degradation level reported to the embedding UI, recomputed after every
/// lifecycle transition (see §7 of the specification this crate implements).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum DegradationLevel {
    /// Face analyzer and object detector both running.
    Full,
    /// Object detector disabled; face analyzer still running.
    FaceOnly,
    /// Neither ML signal running; environment signals only.
    Basic,
}

impl DegradationLevel {
    pub fn from_flags(face_ok: bool, object_ok: bool) -> Self {
        match (face_ok, object_ok) {
            (true, true) => DegradationLevel::Full,
            (true, false) => DegradationLevel::FaceOnly,
            (false, _) => DegradationLevel::Basic,
        }
    }
}

// ---------------------------------------------------------------------------
// Alert kinds (closed set, §4.4)
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertKind {
    NoFace,
    LookingAway,
    Speaking,
    MultiPerson,
    PhoneDetected,
    MaterialDetected,
    HeadphonesDetected,
    TabSwitch,
    FullscreenExit,
    MultiScreen,
    CopyPasteAttempt,
    RightClick,
    KeyboardShortcut,
    RemoteDesktop,
    FaceVerificationFailed,
    ManualFlag,
    /// Not part of the closed alert-kind set exposed to the UI; recorded when
    /// the in-memory overflow buffer drops events (§4.6).
    LedgerOverflow,
}

impl AlertKind {
    /// All alert kinds the UI may pass to `log_event`, i.e. everything except
    /// the kernel-internal `LedgerOverflow` bookkeeping kind.
    pub const UI_VISIBLE: &'static [AlertKind] = &[
        AlertKind::NoFace,
        AlertKind::LookingAway,
        AlertKind::Speaking,
        AlertKind::MultiPerson,
        AlertKind::PhoneDetected,
        AlertKind::MaterialDetected,
        AlertKind::HeadphonesDetected,
        AlertKind::TabSwitch,
        AlertKind::FullscreenExit,
        AlertKind::MultiScreen,
        AlertKind::CopyPasteAttempt,
        AlertKind::RightClick,
        AlertKind::KeyboardShortcut,
        AlertKind::RemoteDesktop,
        AlertKind::FaceVerificationFailed,
        AlertKind::ManualFlag,
    ];

    pub fn is_ui_loggable(self) -> bool {
        Self::UI_VISIBLE.contains(&self)
    }

    /// Parses the PascalCase variant name used in config files
    /// (`session.evidence_kinds`) and over the HTTP boundary.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "NoFace" => Ok(Self::NoFace),
            "LookingAway" => Ok(Self::LookingAway),
            "Speaking" => Ok(Self::Speaking),
            "MultiPerson" => Ok(Self::MultiPerson),
            "PhoneDetected" => Ok(Self::PhoneDetected),
            "MaterialDetected" => Ok(Self::MaterialDetected),
            "HeadphonesDetected" => Ok(Self::HeadphonesDetected),
            "TabSwitch" => Ok(Self::TabSwitch),
            "FullscreenExit" => Ok(Self::FullscreenExit),
            "MultiScreen" => Ok(Self::MultiScreen),
            "CopyPasteAttempt" => Ok(Self::CopyPasteAttempt),
            "RightClick" => Ok(Self::RightClick),
            "KeyboardShortcut" => Ok(Self::KeyboardShortcut),
            "RemoteDesktop" => Ok(Self::RemoteDesktop),
            "FaceVerificationFailed" => Ok(Self::FaceVerificationFailed),
            "ManualFlag" => Ok(Self::ManualFlag),
            "LedgerOverflow" => Ok(Self::LedgerOverflow),
            other => Err(anyhow!("unknown alert kind '{}'", other)),
        }
    }

    /// Default severity for a freshly-fired alert of this kind, before the
    /// repeat-count escalation rule in §4.4 ("PhoneDetected after N repeats").
    pub fn base_severity(self) -> Severity {
        match self {
            AlertKind::MultiPerson
            | AlertKind::MultiScreen
            | AlertKind::RemoteDesktop
            | AlertKind::FaceVerificationFailed
            | AlertKind::ManualFlag => Severity::Critical,
            AlertKind::RightClick => Severity::Info,
            AlertKind::LedgerOverflow => Severity::Warning,
            _ => Severity::Warning,
        }
    }

    /// Whether this alert kind is captured as evidence by default
    /// (`session.evidence_kinds` default set, §6).
    pub fn default_evidence_kind(self) -> bool {
        matches!(
            self,
            AlertKind::PhoneDetected
                | AlertKind::MaterialDetected
                | AlertKind::HeadphonesDetected
                | AlertKind::MultiPerson
                | AlertKind::FaceVerificationFailed
        )
    }

    /// Default per-kind cooldown, per §4.4.
    pub fn default_cooldown_ms(self) -> u64 {
        match self {
            AlertKind::PhoneDetected | AlertKind::MaterialDetected | AlertKind::HeadphonesDetected => 8_000,
            AlertKind::MultiPerson | AlertKind::Speaking => 10_000,
            AlertKind::LookingAway => 8_000,
            _ => 5_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventSource {
    FaceAnalyzer,
    ObjectDetector,
    Environment,
    Verifier,
    Operator,
}

// ---------------------------------------------------------------------------
// Events and evidence
// ---------------------------------------------------------------------------

/// Opaque reference to an encoded evidence image in the private object store
/// (§3, §6). Object key is always `{session_id}/{event_sequence}.jpg`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceHandle {
    pub bucket: String,
    pub object_key: String,
}

impl EvidenceHandle {
    pub fn for_event(session_id: &str, sequence: u64) -> Self {
        Self {
            bucket: "proctoring-evidence".to_string(),
            object_key: format!("{session_id}/{sequence}.jpg"),
        }
    }
}

/// An atomic, append-only entry in a session's ledger (§3, §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub sequence: u64,
    pub kind: AlertKind,
    pub severity: Severity,
    pub details: BTreeMap<String, String>,
    pub evidence_handle: Option<EvidenceHandle>,
    pub timestamp_ms: u64,
    pub source: EventSource,
    pub idempotency_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Integrity report
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn from_score(score: i32) -> Self {
        if score >= 90 {
            RiskTier::Low
        } else if score >= 70 {
            RiskTier::Medium
        } else if score >= 50 {
            RiskTier::High
        } else {
            RiskTier::Critical
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub session_id: String,
    pub score: i32,
    pub tier: RiskTier,
    pub per_kind_counts: BTreeMap<AlertKind, u32>,
    pub explanation: String,
}

// ---------------------------------------------------------------------------
// Session-level counters (§4.4)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionCounters {
    pub cheat_count: u32,
    pub tab_violations: u32,
    pub fullscreen_violations: u32,
    pub gaze_away_count: u32,
    pub face_verification_failures: u32,
    pub multi_screen_detected: bool,
    pub critical_count: u32,
}

// ---------------------------------------------------------------------------
// Boundary error taxonomy (§7)
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("maximum attempts reached for this exam")]
    MaxAttemptsReached,
    #[error("exam is not currently available")]
    ExamNotAvailable,
    #[error("candidate is not enrolled")]
    NotEnrolled,
    #[error("camera could not be acquired")]
    CameraUnavailable,
    #[error("initial face verification failed")]
    FaceVerificationFailed,
    #[error("face verifier model is unavailable")]
    VerifierUnavailable,
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("session is not active")]
    SessionClosed,
    #[error("submission could not be completed: {0}")]
    SubmitIncomplete(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no face detected in frame")]
    NoFace,
    #[error("more than one face detected in frame")]
    MultiPerson,
    #[error("verifier model is unavailable")]
    VerifierUnavailable,
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LogEventError {
    #[error("unknown alert kind")]
    UnknownKind,
    #[error("session is not active")]
    SessionClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("session is not active")]
    SessionClosed,
    #[error("ledger store is unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::LedgerUnavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Ledger hash-chain primitives, re-exported at crate root for convenience.
// ---------------------------------------------------------------------------

pub fn hash_entry(prev_hash: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(payload);
    hasher.finalize().into()
}

pub fn signing_key_from_seed(seed: &str) -> Result<SigningKey> {
    let trimmed = seed.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("signing key seed is required"));
    }
    let mut hasher = Sha256::new();
    hasher.update(trimmed.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    Ok(SigningKey::from_bytes(&digest))
}

pub fn sign_entry(signing_key: &SigningKey, entry_hash: &[u8; 32]) -> [u8; 64] {
    signing_key.sign(entry_hash).to_bytes()
}

pub fn verify_entry_signature(
    verifying_key: &VerifyingKey,
    entry_hash: &[u8; 32],
    signature: &[u8; 64],
) -> Result<()> {
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(entry_hash, &sig)
        .map_err(|e| anyhow!("signature verification failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tier_boundaries() {
        assert_eq!(RiskTier::from_score(100), RiskTier::Low);
        assert_eq!(RiskTier::from_score(90), RiskTier::Low);
        assert_eq!(RiskTier::from_score(89), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(70), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(69), RiskTier::High);
        assert_eq!(RiskTier::from_score(50), RiskTier::High);
        assert_eq!(RiskTier::from_score(49), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(0), RiskTier::Critical);
    }

    #[test]
    fn degradation_level_from_flags() {
        assert_eq!(DegradationLevel::from_flags(true, true), DegradationLevel::Full);
        assert_eq!(DegradationLevel::from_flags(true, false), DegradationLevel::FaceOnly);
        assert_eq!(DegradationLevel::from_flags(false, true), DegradationLevel::Basic);
        assert_eq!(DegradationLevel::from_flags(false, false), DegradationLevel::Basic);
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key = signing_key_from_seed("devkey:test-seed").unwrap();
        let hash = hash_entry(&[0u8; 32], b"payload");
        let sig = sign_entry(&key, &hash);
        verify_entry_signature(&key.verifying_key(), &hash, &sig).unwrap();
    }

    #[test]
    fn evidence_handle_object_key_format() {
        let handle = EvidenceHandle::for_event("sess-1", 7);
        assert_eq!(handle.object_key, "sess-1/7.jpg");
        assert_eq!(handle.bucket, "proctoring-evidence");
    }

    #[test]
    fn alert_kind_parse_round_trips() {
        assert_eq!(AlertKind::parse("PhoneDetected").unwrap(), AlertKind::PhoneDetected);
        assert_eq!(AlertKind::parse("LedgerOverflow").unwrap(), AlertKind::LedgerOverflow);
        assert!(AlertKind::parse("NotAKind").is_err());
    }
}
