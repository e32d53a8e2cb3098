//! Session supervisor (C9): the state machine that owns one candidate's
//! exam attempt end to end — camera frames in, throttled/evidenced/ledgered
//! alerts and a final integrity report out. Ties together the frame pump
//! (C1/`camera`, `frame`), the two ML surfaces (C2 `face`, C3 `detect`),
//! fusion/throttling (C4 `fusion`), evidence capture (C5 `capture`), the
//! session ledger (C6 `ledger`), identity verification (C7 `verifier`), and
//! the AI guardian (C8 `guardian`). `api` (C10) is a thin HTTP shell over
//! this module's lifecycle methods.

use std::collections::{BTreeMap, HashMap};

use ed25519_dalek::SigningKey;

use crate::camera::CameraSource;
use crate::capture::{capture_evidence, ObjectStore};
use crate::config::SessionConfig;
use crate::detect::{DetectorBackend, ObjectClass};
use crate::face::{FaceLandmarkBackend, GazeDirection};
use crate::frame::{FrameBuffer, RawFrame};
use crate::fusion::{ThrottleDecision, Throttler};
use crate::guardian::AiGuardian;
use crate::ledger::SessionLedger;
use crate::verifier::{BiometricTemplate, EmbeddingBackend, FaceVerifier};
use crate::{
    AlertKind, DegradationLevel, Event, EventSource, IntegrityReport, LogEventError, RiskTier, SessionCounters,
    SessionState, Severity, StartError, SubmitError, VerifyError,
};

/// Frame retention window backing the verifier's majority-vote buffer,
/// independent of camera frame rate (§4.7 schedules a re-verification every
/// few minutes, not every frame).
const FRAME_BUFFER_MAX_AGE_MS: u64 = 10_000;

/// Alert kinds treated as "object/AI" signals for the purposes of
/// `cheat_count` (§4.4: "cheat_count (sum of all object/AI alerts)"),
/// distinct from the kinds that roll up into their own dedicated counter
/// (`TabSwitch`, `FullscreenExit`, `MultiScreen`, `FaceVerificationFailed`).
const OBJECT_AI_KINDS: &[AlertKind] = &[
    AlertKind::NoFace,
    AlertKind::LookingAway,
    AlertKind::Speaking,
    AlertKind::MultiPerson,
    AlertKind::PhoneDetected,
    AlertKind::MaterialDetected,
    AlertKind::HeadphonesDetected,
];

/// Per-attempt state tracked between lifecycle calls. Not exposed directly;
/// callers observe it through [`SessionSupervisor`]'s methods.
struct SessionHandle {
    state: SessionState,
    counters: SessionCounters,
    degradation: DegradationLevel,
    throttler: Throttler,
    template: Option<BiometricTemplate>,
    /// Consecutive frames with zero faces detected (§4.2, §4.4, §8).
    consecutive_no_face: u32,
    /// Consecutive frames with gaze flagged "away" (§4.2, §4.4).
    consecutive_looking_away: u32,
}

/// Updates `counters` for a just-fired event of `kind`/`severity`. Critical
/// events roll up only into `critical_count`, never also into `cheat_count`
/// — see the module-level seed-scenario note on `OBJECT_AI_KINDS` (§8
/// scenario e: one critical `MultiPerson` plus one warning `PhoneDetected`
/// yields `critical_count = 1, cheat_count = 1`, not 2).
fn update_counters(counters: &mut SessionCounters, kind: AlertKind, severity: Severity) {
    match kind {
        AlertKind::TabSwitch => counters.tab_violations += 1,
        AlertKind::FullscreenExit => counters.fullscreen_violations += 1,
        AlertKind::LookingAway => counters.gaze_away_count += 1,
        AlertKind::MultiScreen => counters.multi_screen_detected = true,
        AlertKind::FaceVerificationFailed => counters.face_verification_failures += 1,
        _ => {}
    }

    if severity == Severity::Critical {
        counters.critical_count += 1;
    } else if OBJECT_AI_KINDS.contains(&kind) {
        counters.cheat_count += 1;
    }
}

/// Derives this frame's candidate alert kinds, folding in the consecutive-
/// frame confirmation state for `NoFace`/`LookingAway` (§4.2, §4.4, §8):
/// both require `consecutive_frames` confirming frames in a row before
/// firing, and reset to zero on any frame that doesn't confirm.
fn candidate_kinds_from_frame(
    handle: &mut SessionHandle,
    face_signal: Option<&crate::face::FaceSignal>,
    detection: &crate::detect::DetectionResult,
    consecutive_frames: u32,
) -> Vec<AlertKind> {
    let mut kinds = Vec::new();

    let no_face_this_frame = face_signal.map(|s| s.face_count == 0).unwrap_or(true);
    handle.consecutive_no_face = if no_face_this_frame { handle.consecutive_no_face + 1 } else { 0 };
    if handle.consecutive_no_face >= consecutive_frames {
        kinds.push(AlertKind::NoFace);
    }

    let looking_away_this_frame = face_signal.map(|s| s.gaze_direction == GazeDirection::Away).unwrap_or(false);
    handle.consecutive_looking_away = if looking_away_this_frame { handle.consecutive_looking_away + 1 } else { 0 };
    if handle.consecutive_looking_away >= consecutive_frames {
        kinds.push(AlertKind::LookingAway);
    }

    if let Some(signal) = face_signal {
        if signal.face_count > 1 {
            kinds.push(AlertKind::MultiPerson);
        }
        if signal.mouth_open {
            kinds.push(AlertKind::Speaking);
        }
    }

    if detection.contains_class(ObjectClass::Person) && detection.detections.iter().filter(|d| d.class == ObjectClass::Person).count() > 1 {
        if !kinds.contains(&AlertKind::MultiPerson) {
            kinds.push(AlertKind::MultiPerson);
        }
    }
    if detection.contains_class(ObjectClass::Phone) {
        kinds.push(AlertKind::PhoneDetected);
    }
    if detection.contains_class(ObjectClass::Material) {
        kinds.push(AlertKind::MaterialDetected);
    }
    if detection.contains_class(ObjectClass::Headphones) {
        kinds.push(AlertKind::HeadphonesDetected);
    }

    kinds
}

/// Owns the shared, out-of-process boundaries (camera, ML backends, object
/// store, ledger, guardian) and the per-session state for every attempt
/// currently in flight. A deployment typically wraps one instance behind a
/// mutex and drives it from the frame pump loop plus the HTTP layer (C10).
pub struct SessionSupervisor {
    camera: Box<dyn CameraSource>,
    face_backend: Box<dyn FaceLandmarkBackend>,
    detect_backend: Box<dyn DetectorBackend>,
    embedding_backend: Box<dyn EmbeddingBackend>,
    object_store: Box<dyn ObjectStore>,
    ledger: Box<dyn SessionLedger>,
    guardian: AiGuardian,
    verifier: FaceVerifier,
    signing_key: SigningKey,
    config: SessionConfig,
    attempts_by_exam: HashMap<String, u32>,
    sessions: HashMap<String, SessionHandle>,
    frame_buffers: HashMap<String, FrameBuffer>,
}

#[allow(clippy::too_many_arguments)]
impl SessionSupervisor {
    pub fn new(
        camera: Box<dyn CameraSource>,
        face_backend: Box<dyn FaceLandmarkBackend>,
        detect_backend: Box<dyn DetectorBackend>,
        embedding_backend: Box<dyn EmbeddingBackend>,
        object_store: Box<dyn ObjectStore>,
        ledger: Box<dyn SessionLedger>,
        guardian: AiGuardian,
        signing_key: SigningKey,
        config: SessionConfig,
    ) -> Self {
        let verifier = FaceVerifier::new(config.verifier.threshold, config.verifier.min_matches);
        Self {
            camera,
            face_backend,
            detect_backend,
            embedding_backend,
            object_store,
            ledger,
            guardian,
            verifier,
            signing_key,
            config,
            attempts_by_exam: HashMap::new(),
            sessions: HashMap::new(),
            frame_buffers: HashMap::new(),
        }
    }

    pub fn state(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.get(session_id).map(|h| h.state)
    }

    pub fn counters(&self, session_id: &str) -> Option<&SessionCounters> {
        self.sessions.get(session_id).map(|h| &h.counters)
    }

    fn new_frame_buffer(&self) -> FrameBuffer {
        FrameBuffer::new(self.config.verifier.frame_count.max(1) as usize, FRAME_BUFFER_MAX_AGE_MS)
    }

    /// Starts a new attempt: connects the camera, captures an enrollment
    /// frame, and enrolls a biometric template from it. `exam_id` scopes the
    /// `max_attempts` counter independently of `session_id` (one exam may be
    /// attempted, abandoned, and restarted up to the configured limit).
    pub fn start(&mut self, session_id: &str, exam_id: &str) -> Result<SessionState, StartError> {
        let attempts = self.attempts_by_exam.entry(exam_id.to_string()).or_insert(0);
        if *attempts >= self.config.max_attempts {
            return Err(StartError::MaxAttemptsReached);
        }

        self.camera.connect().map_err(|_| StartError::CameraUnavailable)?;
        let frame = self.camera.next_frame().map_err(|_| StartError::CameraUnavailable)?;

        let template = {
            let view = frame.inference_view();
            self.verifier.enroll(&view, self.embedding_backend.as_mut()).map_err(|e| match e {
                VerifyError::NoFace => StartError::FaceVerificationFailed,
                VerifyError::MultiPerson => StartError::FaceVerificationFailed,
                VerifyError::VerifierUnavailable => StartError::VerifierUnavailable,
                VerifyError::InternalInconsistency(msg) => StartError::InternalInconsistency(msg),
            })?
        };

        *attempts += 1;

        let mut buffer = self.new_frame_buffer();
        buffer.push(frame);
        self.frame_buffers.insert(session_id.to_string(), buffer);

        self.sessions.insert(
            session_id.to_string(),
            SessionHandle {
                state: SessionState::Active,
                counters: SessionCounters::default(),
                degradation: DegradationLevel::Full,
                throttler: Throttler::new().with_escalation_repeat_count(self.config.escalation_repeat_count),
                template: Some(template),
                consecutive_no_face: 0,
                consecutive_looking_away: 0,
            },
        );

        Ok(SessionState::Active)
    }

    /// Captures one frame from the owned camera source and runs it through
    /// the full fusion/throttling/ledger pipeline via [`Self::process_frame`].
    /// This is what the frame pump loop (§4.1) calls on each tick.
    pub fn pump_frame(&mut self, session_id: &str) -> anyhow::Result<Vec<Event>> {
        let active = self.sessions.get(session_id).map(|h| !h.state.is_terminal()).unwrap_or(false);
        if !active {
            return Ok(Vec::new());
        }
        let frame = self.camera.next_frame()?;
        self.process_frame(session_id, frame)
    }

    /// Runs one captured frame through the ML surfaces, fuses their output
    /// into candidate alerts, throttles, captures evidence, and appends to
    /// the session ledger. Frames for an unknown or terminal session are
    /// silently dropped, matching the closed-for-new-events invariant.
    pub fn process_frame(&mut self, session_id: &str, frame: RawFrame) -> anyhow::Result<Vec<Event>> {
        let active = self.sessions.get(session_id).map(|h| !h.state.is_terminal()).unwrap_or(false);
        if !active {
            return Ok(Vec::new());
        }

        let now_ms = crate::now_ms()?;
        let default_buffer = self.new_frame_buffer();
        let buffer = self.frame_buffers.entry(session_id.to_string()).or_insert(default_buffer);
        buffer.push(frame);
        let Some(latest) = buffer.latest() else {
            return Ok(Vec::new());
        };
        let view = latest.inference_view();

        let face_result = view.run_face_backend(self.face_backend.as_mut());
        let face_ok = face_result.is_ok();
        let face_signal = face_result.ok().flatten();
        let detection_result = view.run_object_detector(self.detect_backend.as_mut());
        let object_ok = detection_result.is_ok();
        let detection = detection_result.unwrap_or_default();

        let consecutive_frames = self.config.face.consecutive_frames;

        // Disjoint-field borrow: avoids holding a whole-`self` mutable borrow
        // (as a helper method returning `&mut SessionHandle` would) while
        // `guardian`/`ledger`/`object_store` are also needed below.
        let Self {
            sessions,
            guardian,
            ledger,
            object_store,
            signing_key,
            config,
            ..
        } = self;

        let Some(handle) = sessions.get_mut(session_id).filter(|h| !h.state.is_terminal()) else {
            return Ok(Vec::new());
        };
        handle.degradation = DegradationLevel::from_flags(face_ok, object_ok);

        let candidate_kinds = candidate_kinds_from_frame(handle, face_signal.as_ref(), &detection, consecutive_frames);

        let mut fired = Vec::new();
        for kind in candidate_kinds {
            let decision = handle.throttler.evaluate(kind, now_ms);
            let ThrottleDecision::Fire { severity, repeat_count } = decision else {
                continue;
            };
            update_counters(&mut handle.counters, kind, severity);

            let mut details = BTreeMap::new();
            details.insert("repeat_count".to_string(), repeat_count.to_string());
            details.insert("warning".to_string(), guardian.warning_for(kind, repeat_count));

            let evidence_handle = if config.evidence_kinds.contains(&kind) {
                let sequence = ledger.events_for_session(session_id)?.len() as u64;
                capture_evidence(object_store.as_mut(), &view, session_id, sequence, config.capture.jpeg_quality).ok()
            } else {
                None
            };

            let sequence = ledger.append(
                session_id,
                kind,
                severity,
                details.clone(),
                evidence_handle.clone(),
                source_for_kind(kind),
                now_ms,
                None,
                signing_key,
            )?;

            fired.push(Event {
                session_id: session_id.to_string(),
                sequence,
                kind,
                severity,
                details,
                evidence_handle,
                timestamp_ms: now_ms,
                source: source_for_kind(kind),
                idempotency_token: None,
            });
        }

        Ok(fired)
    }

    /// Logs a browser/environment-sourced signal (tab switch, fullscreen
    /// exit, copy/paste, etc.) reported directly by the exam UI over the C10
    /// HTTP boundary. Returns `Ok(None)` when the event was suppressed by
    /// the session's cooldown rather than an error.
    pub fn log_event(
        &mut self,
        session_id: &str,
        kind: AlertKind,
        mut details: BTreeMap<String, String>,
        idempotency_token: Option<String>,
    ) -> Result<Option<Event>, LogEventError> {
        if !kind.is_ui_loggable() {
            return Err(LogEventError::UnknownKind);
        }
        let now_ms = crate::now_ms().map_err(|_| LogEventError::UnknownKind)?;

        let Self { sessions, guardian, ledger, signing_key, .. } = self;

        let handle = sessions.get_mut(session_id).filter(|h| !h.state.is_terminal());
        let Some(handle) = handle else {
            return Err(LogEventError::SessionClosed);
        };

        let decision = handle.throttler.evaluate(kind, now_ms);
        let ThrottleDecision::Fire { severity, repeat_count } = decision else {
            return Ok(None);
        };
        update_counters(&mut handle.counters, kind, severity);
        details.insert("repeat_count".to_string(), repeat_count.to_string());
        details.insert("warning".to_string(), guardian.warning_for(kind, repeat_count));

        let sequence = ledger
            .append(
                session_id,
                kind,
                severity,
                details.clone(),
                None,
                source_for_kind(kind),
                now_ms,
                idempotency_token.clone(),
                signing_key,
            )
            .map_err(|_| LogEventError::SessionClosed)?;

        Ok(Some(Event {
            session_id: session_id.to_string(),
            sequence,
            kind,
            severity,
            details,
            evidence_handle: None,
            timestamp_ms: now_ms,
            source: source_for_kind(kind),
            idempotency_token,
        }))
    }

    /// Re-checks a session's live identity against its enrolled template
    /// using a short window of recent frames (majority vote, §4.7). On
    /// mismatch, raises a throttled `FaceVerificationFailed` alert the same
    /// way `process_frame` raises ML-derived alerts.
    pub fn reverify_identity(&mut self, session_id: &str) -> Result<bool, VerifyError> {
        let template = self
            .sessions
            .get(session_id)
            .and_then(|h| h.template.as_ref())
            .ok_or(VerifyError::NoFace)?;

        let frame_count = self.config.verifier.frame_count as usize;
        let recent_frames: Vec<&RawFrame> = self
            .frame_buffers
            .get(session_id)
            .map(|b| b.recent(frame_count).collect())
            .unwrap_or_default();
        let views: Vec<_> = recent_frames.iter().map(|f| f.inference_view()).collect();

        let verified = self.verifier.verify_majority(&views, self.embedding_backend.as_mut(), template)?;

        if !verified {
            let now_ms = crate::now_ms().map_err(|e| VerifyError::InternalInconsistency(e.to_string()))?;
            let Self { sessions, ledger, signing_key, .. } = self;
            if let Some(handle) = sessions.get_mut(session_id).filter(|h| !h.state.is_terminal()) {
                let decision = handle.throttler.evaluate(AlertKind::FaceVerificationFailed, now_ms);
                if let ThrottleDecision::Fire { severity, .. } = decision {
                    update_counters(&mut handle.counters, AlertKind::FaceVerificationFailed, severity);
                    let _ = ledger.append(
                        session_id,
                        AlertKind::FaceVerificationFailed,
                        severity,
                        BTreeMap::new(),
                        None,
                        EventSource::Verifier,
                        now_ms,
                        None,
                        signing_key,
                    );
                }
            }
        }

        Ok(verified)
    }

    /// Records an answer submission. The proctoring kernel does not grade
    /// answers; this only gates the call on the session still being active.
    pub fn submit_answer(&mut self, session_id: &str, _question_id: &str, _answer: &str) -> Result<(), SubmitError> {
        match self.sessions.get(session_id) {
            Some(handle) if !handle.state.is_terminal() => Ok(()),
            Some(_) => Err(SubmitError::SessionClosed),
            None => Err(SubmitError::SessionClosed),
        }
    }

    /// Closes the session and produces its integrity report.
    pub fn submit(&mut self, session_id: &str) -> Result<IntegrityReport, SubmitError> {
        self.close_session(session_id, SessionState::Submitted)
    }

    /// Force-closes the session (e.g. time limit elapsed) and produces its
    /// integrity report, identically to `submit` except for the resulting
    /// state tag.
    pub fn auto_submit(&mut self, session_id: &str) -> Result<IntegrityReport, SubmitError> {
        self.close_session(session_id, SessionState::AutoSubmitted)
    }

    /// Computes the §4.8/§8 integrity score from a session's counters:
    /// `100 - 10*cheat_count - 5*tab_violations - 5*fullscreen_violations -
    /// 1*gaze_away_count - 15*face_verification_failures -
    /// 20*critical_count`, clamped to `[0, 100]`.
    fn integrity_score(counters: &SessionCounters) -> i32 {
        let raw = 100
            - 10 * counters.cheat_count as i32
            - 5 * counters.tab_violations as i32
            - 5 * counters.fullscreen_violations as i32
            - counters.gaze_away_count as i32
            - 15 * counters.face_verification_failures as i32
            - 20 * counters.critical_count as i32;
        raw.clamp(0, 100)
    }

    fn close_session(&mut self, session_id: &str, terminal_state: SessionState) -> Result<IntegrityReport, SubmitError> {
        let handle = match self.sessions.get_mut(session_id) {
            Some(handle) if !handle.state.is_terminal() => handle,
            Some(_) => return Err(SubmitError::SessionClosed),
            None => return Err(SubmitError::SessionClosed),
        };
        handle.state = terminal_state;
        // Clone the counters before touching the ledger: the score formula
        // (§4.8/§8) must read only the already-populated session counters,
        // independent of whatever events the ledger happens to hold.
        let counters = handle.counters.clone();

        let events = self
            .ledger
            .events_for_session(session_id)
            .map_err(|e| SubmitError::InternalInconsistency(e.to_string()))?;

        let mut per_kind_counts: BTreeMap<AlertKind, u32> = BTreeMap::new();
        for event in &events {
            *per_kind_counts.entry(event.kind).or_insert(0) += 1;
        }

        let score = Self::integrity_score(&counters);
        let tier = RiskTier::from_score(score);

        let top_kind = per_kind_counts.iter().max_by_key(|(_, count)| **count).map(|(kind, _)| *kind);
        let deterministic_explanation = match top_kind {
            Some(kind) => format!(
                "{} total flagged event(s); most frequent: {:?} ({} occurrence(s)).",
                events.len(),
                kind,
                per_kind_counts[&kind]
            ),
            None => "No flagged events recorded for this session.".to_string(),
        };

        // §4.8: generative explanation only for high/critical tier with > 5
        // events, and only when the rate limiter permits; anything else uses
        // the deterministic paragraph above.
        let explanation = if matches!(tier, RiskTier::High | RiskTier::Critical) && events.len() > 5 {
            let prompt = format!(
                "Write a short, neutral paragraph summarizing an exam-integrity report: score {}, tier {:?}, {} flagged events, most frequent kind {:?}.",
                score, tier, events.len(), top_kind
            );
            self.guardian.report_explanation(deterministic_explanation, &prompt)
        } else {
            deterministic_explanation
        };

        Ok(IntegrityReport {
            session_id: session_id.to_string(),
            score,
            tier,
            per_kind_counts,
            explanation,
        })
    }
}

fn source_for_kind(kind: AlertKind) -> EventSource {
    match kind {
        AlertKind::NoFace | AlertKind::LookingAway | AlertKind::Speaking | AlertKind::MultiPerson => EventSource::FaceAnalyzer,
        AlertKind::PhoneDetected | AlertKind::MaterialDetected | AlertKind::HeadphonesDetected => EventSource::ObjectDetector,
        AlertKind::FaceVerificationFailed => EventSource::Verifier,
        AlertKind::ManualFlag => EventSource::Operator,
        _ => EventSource::Environment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, StubCameraSource};
    use crate::capture::InMemoryObjectStore;
    use crate::detect::{Detection, DetectionResult, StubBackend};
    use crate::face::{FaceSignal, StubFaceBackend};
    use crate::ledger::InMemorySessionLedger;
    use crate::signing_key_from_seed;
    use crate::verifier::StubEmbeddingBackend;

    fn supervisor() -> SessionSupervisor {
        SessionSupervisor::new(
            Box::new(StubCameraSource::new(CameraConfig { width: 4, height: 4 })),
            Box::new(StubFaceBackend::new()),
            Box::new(StubBackend::new()),
            Box::new(StubEmbeddingBackend::new()),
            Box::new(InMemoryObjectStore::new()),
            Box::new(InMemorySessionLedger::new()),
            AiGuardian::new(),
            signing_key_from_seed("devkey:supervisor-test").unwrap(),
            SessionConfig::default(),
        )
    }

    #[test]
    fn start_enrolls_and_activates_session() {
        let mut sup = supervisor();
        let state = sup.start("sess-1", "exam-1").unwrap();
        assert_eq!(state, SessionState::Active);
        assert_eq!(sup.state("sess-1"), Some(SessionState::Active));
    }

    #[test]
    fn start_respects_max_attempts() {
        let mut cfg = SessionConfig::default();
        cfg.max_attempts = 1;
        let mut sup = SessionSupervisor::new(
            Box::new(StubCameraSource::new(CameraConfig { width: 4, height: 4 })),
            Box::new(StubFaceBackend::new()),
            Box::new(StubBackend::new()),
            Box::new(StubEmbeddingBackend::new()),
            Box::new(InMemoryObjectStore::new()),
            Box::new(InMemorySessionLedger::new()),
            AiGuardian::new(),
            signing_key_from_seed("devkey:supervisor-test-2").unwrap(),
            cfg,
        );
        sup.start("sess-1", "exam-1").unwrap();
        let second = sup.start("sess-2", "exam-1");
        assert!(matches!(second, Err(StartError::MaxAttemptsReached)));
    }

    #[test]
    fn log_event_rejects_unknown_kind() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        let result = sup.log_event("sess-1", AlertKind::LedgerOverflow, BTreeMap::new(), None);
        assert!(matches!(result, Err(LogEventError::UnknownKind)));
    }

    #[test]
    fn log_event_fires_then_suppresses_within_cooldown() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        let first = sup.log_event("sess-1", AlertKind::TabSwitch, BTreeMap::new(), None).unwrap();
        assert!(first.is_some());
        let second = sup.log_event("sess-1", AlertKind::TabSwitch, BTreeMap::new(), None).unwrap();
        assert!(second.is_none(), "second call within cooldown should be suppressed");
    }

    #[test]
    fn log_event_rejects_terminal_session() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.submit("sess-1").unwrap();
        let result = sup.log_event("sess-1", AlertKind::TabSwitch, BTreeMap::new(), None);
        assert!(matches!(result, Err(LogEventError::SessionClosed)));
    }

    #[test]
    fn submit_produces_integrity_report_reflecting_logged_events() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.log_event("sess-1", AlertKind::TabSwitch, BTreeMap::new(), None).unwrap();
        let report = sup.submit("sess-1").unwrap();
        assert_eq!(report.session_id, "sess-1");
        assert!(report.score < 100);
        assert_eq!(*report.per_kind_counts.get(&AlertKind::TabSwitch).unwrap(), 1);
    }

    #[test]
    fn submit_twice_fails() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.submit("sess-1").unwrap();
        assert!(matches!(sup.submit("sess-1"), Err(SubmitError::SessionClosed)));
    }

    #[test]
    fn seed_scenario_b_single_phone_flash_scores_90() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.detect_backend = Box::new(StubBackend::with_script(vec![DetectionResult {
            detections: vec![Detection {
                x: 0.1,
                y: 0.1,
                w: 0.2,
                h: 0.2,
                confidence: 0.72,
                class: ObjectClass::Phone,
            }],
            confidence: 0.72,
        }]));
        sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
        let report = sup.submit("sess-1").unwrap();
        assert_eq!(report.score, 90);
        assert_eq!(report.tier, RiskTier::Low);
    }

    #[test]
    fn seed_scenario_e_multi_person_and_phone_scores_70() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.detect_backend = Box::new(StubBackend::with_script(vec![DetectionResult {
            detections: vec![
                Detection { x: 0.0, y: 0.0, w: 0.1, h: 0.1, confidence: 0.9, class: ObjectClass::Person },
                Detection { x: 0.2, y: 0.2, w: 0.1, h: 0.1, confidence: 0.8, class: ObjectClass::Person },
                Detection { x: 0.4, y: 0.4, w: 0.1, h: 0.1, confidence: 0.7, class: ObjectClass::Phone },
            ],
            confidence: 0.9,
        }]));
        sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
        let report = sup.submit("sess-1").unwrap();
        assert_eq!(report.score, 70);
        assert_eq!(report.tier, RiskTier::Medium);
    }

    #[test]
    fn looking_away_requires_three_consecutive_confirming_frames() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.face_backend = Box::new(StubFaceBackend::with_script(vec![
            Some(FaceSignal { face_count: 1, gaze_direction: GazeDirection::Away, mouth_open: false, bounding_box: None }),
            Some(FaceSignal { face_count: 1, gaze_direction: GazeDirection::Center, mouth_open: false, bounding_box: None }),
            Some(FaceSignal { face_count: 1, gaze_direction: GazeDirection::Away, mouth_open: false, bounding_box: None }),
            Some(FaceSignal { face_count: 1, gaze_direction: GazeDirection::Away, mouth_open: false, bounding_box: None }),
            Some(FaceSignal { face_count: 1, gaze_direction: GazeDirection::Away, mouth_open: false, bounding_box: None }),
        ]));

        let mut all_fired = Vec::new();
        for _ in 0..5 {
            let fired = sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
            all_fired.extend(fired);
        }

        let looking_away_events = all_fired.iter().filter(|e| e.kind == AlertKind::LookingAway).count();
        assert_eq!(looking_away_events, 1, "only the third consecutive confirming frame should fire");
    }

    #[test]
    fn no_face_fires_exactly_at_consecutive_frame_boundary() {
        let mut sup = supervisor();
        sup.start("sess-1", "exam-1").unwrap();
        sup.face_backend = Box::new(StubFaceBackend::with_script(vec![None, None]));

        let first = sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
        assert!(first.iter().all(|e| e.kind != AlertKind::NoFace), "fewer than consecutive_frames must not fire");

        let second = sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
        assert!(second.iter().all(|e| e.kind != AlertKind::NoFace));

        let third = sup.process_frame("sess-1", RawFrame::new(vec![0u8; 48], 4, 4, 0)).unwrap();
        assert!(third.iter().any(|e| e.kind == AlertKind::NoFace), "exactly consecutive_frames must fire once");
    }
}
