//! Layered configuration (ambient stack): embedded defaults, overridden by
//! an optional TOML/JSON file (path given by `PROCTOR_CONFIG`, format
//! sniffed from extension or tried both ways), overridden again by
//! `PROCTOR_*` environment variables, then validated. Mirrors the old
//! daemon config's file-then-env-then-validate layering.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{ObjectClass, SigmoidMode};
use crate::AlertKind;

const DEFAULT_DB_PATH: &str = "proctor.db";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8799";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 5;
const DEFAULT_ESCALATION_REPEAT_COUNT: u32 = 3;
const DEFAULT_MAX_ATTEMPTS: u32 = 1;
const DEFAULT_DETECT_BACKEND: &str = "auto";
const DEFAULT_FACE_BACKEND: &str = "auto";

const DEFAULT_OBJECT_CONFIDENCE_THRESHOLD: f32 = 0.60;
const MIN_SANE_OBJECT_CONFIDENCE_THRESHOLD: f32 = 0.05;
const DEFAULT_YAW_THRESHOLD: f32 = 0.20;
const DEFAULT_PITCH_THRESHOLD: f32 = 0.30;
const DEFAULT_CONSECUTIVE_FRAMES: u32 = 3;
const DEFAULT_VERIFIER_THRESHOLD: f32 = 0.55;
const DEFAULT_VERIFIER_FRAME_COUNT: u32 = 3;
const DEFAULT_VERIFIER_MIN_MATCHES: u32 = 2;
const DEFAULT_GUARDIAN_RATE_LIMIT_CALLS: u32 = 10;
const DEFAULT_GUARDIAN_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_JPEG_QUALITY: f32 = 0.85;

fn config_string(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

fn config_u32(value: Option<u32>, default: u32) -> u32 {
    value.unwrap_or(default)
}

#[derive(Debug, Deserialize, Default)]
struct ProctorConfigFile {
    db_path: Option<String>,
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    detect: Option<BackendConfigFile>,
    face: Option<BackendConfigFile>,
    embedding: Option<BackendConfigFile>,
    evidence_store: Option<EvidenceStoreConfigFile>,
    generative_service: Option<GenerativeServiceConfigFile>,
    session: Option<SessionConfigFile>,
    object_detector: Option<ObjectDetectorConfigFile>,
    face_analysis: Option<FaceAnalysisConfigFile>,
    verifier: Option<VerifierConfigFile>,
    guardian: Option<GuardianConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    backend: Option<String>,
    tract_model: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct EvidenceStoreConfigFile {
    base_url: Option<String>,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GenerativeServiceConfigFile {
    endpoint: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    escalation_repeat_count: Option<u32>,
    max_attempts: Option<u32>,
    evidence_kinds: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ObjectDetectorConfigFile {
    confidence_threshold: Option<f32>,
    force_sigmoid: Option<String>,
    alert_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct FaceAnalysisConfigFile {
    yaw_threshold: Option<f32>,
    pitch_threshold: Option<f32>,
    consecutive_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct VerifierConfigFile {
    threshold: Option<f32>,
    frame_count: Option<u32>,
    min_matches: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct GuardianConfigFile {
    rate_limit_calls: Option<u32>,
    rate_limit_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    jpeg_quality: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPreference {
    Auto,
    Stub,
    Tract,
}

impl BackendPreference {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "stub" => Ok(Self::Stub),
            "tract" => Ok(Self::Tract),
            other => Err(anyhow!("unsupported backend '{}'; expected 'auto', 'stub', or 'tract'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub backend: BackendPreference,
    pub tract_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct EvidenceStoreSettings {
    pub base_url: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerativeServiceSettings {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// Object-detector tuning (§4.3, §6).
#[derive(Debug, Clone)]
pub struct ObjectDetectorConfig {
    pub confidence_threshold: f32,
    pub force_sigmoid: SigmoidMode,
    pub alert_classes: Vec<ObjectClass>,
}

impl Default for ObjectDetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_OBJECT_CONFIDENCE_THRESHOLD,
            force_sigmoid: SigmoidMode::Auto,
            alert_classes: vec![ObjectClass::Phone, ObjectClass::Material, ObjectClass::Headphones],
        }
    }
}

/// Face-analyzer head-pose and confirmation tuning (§4.2, §4.4, §6).
#[derive(Debug, Clone)]
pub struct FaceConfig {
    pub yaw_threshold: f32,
    pub pitch_threshold: f32,
    /// Consecutive confirming frames required before `LookingAway`/`NoFace`
    /// first fire (§4.2, §4.4, §8).
    pub consecutive_frames: u32,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            yaw_threshold: DEFAULT_YAW_THRESHOLD,
            pitch_threshold: DEFAULT_PITCH_THRESHOLD,
            consecutive_frames: DEFAULT_CONSECUTIVE_FRAMES,
        }
    }
}

/// Biometric verifier tuning (§4.7, §6).
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub threshold: f32,
    pub frame_count: u32,
    pub min_matches: u32,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VERIFIER_THRESHOLD,
            frame_count: DEFAULT_VERIFIER_FRAME_COUNT,
            min_matches: DEFAULT_VERIFIER_MIN_MATCHES,
        }
    }
}

/// AI Guardian rate-limit tuning (§4.8, §6).
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    pub rate_limit_calls: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            rate_limit_calls: DEFAULT_GUARDIAN_RATE_LIMIT_CALLS,
            rate_limit_window_secs: DEFAULT_GUARDIAN_RATE_LIMIT_WINDOW_SECS,
        }
    }
}

/// Evidence capture tuning (§4.5, §6).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// JPEG quality on a `(0, 1]` scale, converted to the `image` crate's
    /// 1..=100 scale at the capture call site.
    pub jpeg_quality: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Per-session behavioral tuning, nested inside [`ProctorConfig`] but also
/// usable standalone when a caller constructs a session programmatically.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub escalation_repeat_count: u32,
    pub max_attempts: u32,
    /// Alert kinds captured as evidence (§4.5, §6); defaults to object
    /// alerts + `MultiPerson` + `FaceVerificationFailed`.
    pub evidence_kinds: Vec<AlertKind>,
    pub object_detector: ObjectDetectorConfig,
    pub face: FaceConfig,
    pub verifier: VerifierConfig,
    pub guardian: GuardianConfig,
    pub capture: CaptureConfig,
}

fn default_evidence_kinds() -> Vec<AlertKind> {
    AlertKind::UI_VISIBLE
        .iter()
        .copied()
        .filter(|k| k.default_evidence_kind())
        .collect()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            escalation_repeat_count: DEFAULT_ESCALATION_REPEAT_COUNT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            evidence_kinds: default_evidence_kinds(),
            object_detector: ObjectDetectorConfig::default(),
            face: FaceConfig::default(),
            verifier: VerifierConfig::default(),
            guardian: GuardianConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<()> {
        if !(MIN_SANE_OBJECT_CONFIDENCE_THRESHOLD..=1.0).contains(&self.object_detector.confidence_threshold) {
            return Err(anyhow!(
                "object_detector.confidence_threshold must be within {}..=1.0 (got {})",
                MIN_SANE_OBJECT_CONFIDENCE_THRESHOLD,
                self.object_detector.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.verifier.threshold) {
            return Err(anyhow!(
                "verifier.threshold must be within 0.0..=1.0 (got {})",
                self.verifier.threshold
            ));
        }
        if self.verifier.frame_count == 0 {
            return Err(anyhow!("verifier.frame_count must be at least 1"));
        }
        if self.verifier.min_matches == 0 || self.verifier.min_matches > self.verifier.frame_count {
            return Err(anyhow!(
                "verifier.min_matches must be between 1 and verifier.frame_count ({})",
                self.verifier.frame_count
            ));
        }
        if self.face.consecutive_frames == 0 {
            return Err(anyhow!("face.consecutive_frames must be at least 1"));
        }
        if self.capture.jpeg_quality <= 0.0 || self.capture.jpeg_quality > 1.0 {
            return Err(anyhow!("capture.jpeg_quality must be within (0.0, 1.0]"));
        }
        if self.escalation_repeat_count == 0 {
            return Err(anyhow!("session.escalation_repeat_count must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("session.max_attempts must be at least 1"));
        }
        if self.guardian.rate_limit_calls == 0 {
            return Err(anyhow!("guardian.rate_limit_calls must be at least 1"));
        }
        if self.guardian.rate_limit_window_secs == 0 {
            return Err(anyhow!("guardian.rate_limit_window_secs must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProctorConfig {
    pub db_path: String,
    pub api_addr: String,
    pub api_token_path: Option<PathBuf>,
    pub camera: CameraSettings,
    pub detect: BackendSettings,
    pub face: BackendSettings,
    pub embedding: BackendSettings,
    pub evidence_store: EvidenceStoreSettings,
    pub generative_service: GenerativeServiceSettings,
    pub session: SessionConfig,
}

impl ProctorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PROCTOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ProctorConfigFile) -> Result<Self> {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let api_addr = file.api.as_ref().and_then(|a| a.addr.clone()).unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let api_token_path = file.api.and_then(|a| a.token_path);

        let camera = CameraSettings {
            width: config_u32(file.camera.as_ref().and_then(|c| c.width), DEFAULT_CAMERA_WIDTH),
            height: config_u32(file.camera.as_ref().and_then(|c| c.height), DEFAULT_CAMERA_HEIGHT),
            target_fps: config_u32(file.camera.as_ref().and_then(|c| c.target_fps), DEFAULT_TARGET_FPS),
        };

        let detect_file = file.detect.unwrap_or_default();
        let detect = BackendSettings {
            backend: BackendPreference::parse(detect_file.backend.as_deref().unwrap_or(DEFAULT_DETECT_BACKEND))?,
            tract_model: detect_file.tract_model,
        };

        let face_file = file.face.unwrap_or_default();
        let face = BackendSettings {
            backend: BackendPreference::parse(face_file.backend.as_deref().unwrap_or(DEFAULT_FACE_BACKEND))?,
            tract_model: face_file.tract_model,
        };

        let embedding_file = file.embedding.unwrap_or_default();
        let embedding = BackendSettings {
            backend: BackendPreference::parse(embedding_file.backend.as_deref().unwrap_or(DEFAULT_FACE_BACKEND))?,
            tract_model: embedding_file.tract_model,
        };

        let evidence_store = EvidenceStoreSettings {
            base_url: config_string(file.evidence_store.as_ref().and_then(|e| e.base_url.clone()), ""),
            auth_token: file.evidence_store.and_then(|e| e.auth_token),
        };

        let generative_service = GenerativeServiceSettings {
            endpoint: file.generative_service.as_ref().and_then(|g| g.endpoint.clone()),
            api_key: file.generative_service.and_then(|g| g.api_key),
        };

        let object_detector_file = file.object_detector.unwrap_or_default();
        let object_detector_defaults = ObjectDetectorConfig::default();
        let force_sigmoid = match object_detector_file.force_sigmoid.as_deref() {
            Some(raw) => SigmoidMode::parse(raw)?,
            None => object_detector_defaults.force_sigmoid,
        };
        let alert_classes = match object_detector_file.alert_classes {
            Some(raw) => raw.iter().map(|s| ObjectClass::parse(s)).collect::<Result<Vec<_>>>()?,
            None => object_detector_defaults.alert_classes,
        };
        let object_detector = ObjectDetectorConfig {
            confidence_threshold: object_detector_file
                .confidence_threshold
                .unwrap_or(object_detector_defaults.confidence_threshold),
            force_sigmoid,
            alert_classes,
        };

        let face_analysis_file = file.face_analysis.unwrap_or_default();
        let face_analysis_defaults = FaceConfig::default();
        let face_analysis = FaceConfig {
            yaw_threshold: face_analysis_file.yaw_threshold.unwrap_or(face_analysis_defaults.yaw_threshold),
            pitch_threshold: face_analysis_file.pitch_threshold.unwrap_or(face_analysis_defaults.pitch_threshold),
            consecutive_frames: face_analysis_file
                .consecutive_frames
                .unwrap_or(face_analysis_defaults.consecutive_frames),
        };

        let verifier_file = file.verifier.unwrap_or_default();
        let verifier_defaults = VerifierConfig::default();
        let verifier = VerifierConfig {
            threshold: verifier_file.threshold.unwrap_or(verifier_defaults.threshold),
            frame_count: verifier_file.frame_count.unwrap_or(verifier_defaults.frame_count),
            min_matches: verifier_file.min_matches.unwrap_or(verifier_defaults.min_matches),
        };

        let guardian_file = file.guardian.unwrap_or_default();
        let guardian_defaults = GuardianConfig::default();
        let guardian = GuardianConfig {
            rate_limit_calls: guardian_file.rate_limit_calls.unwrap_or(guardian_defaults.rate_limit_calls),
            rate_limit_window_secs: guardian_file
                .rate_limit_window_secs
                .unwrap_or(guardian_defaults.rate_limit_window_secs),
        };

        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureConfig {
            jpeg_quality: capture_file.jpeg_quality.unwrap_or(CaptureConfig::default().jpeg_quality),
        };

        let session_file = file.session.unwrap_or_default();
        let evidence_kinds = match session_file.evidence_kinds {
            Some(raw) => raw.iter().map(|s| AlertKind::parse(s)).collect::<Result<Vec<_>>>()?,
            None => default_evidence_kinds(),
        };
        let session = SessionConfig {
            escalation_repeat_count: session_file.escalation_repeat_count.unwrap_or(DEFAULT_ESCALATION_REPEAT_COUNT),
            max_attempts: session_file.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            evidence_kinds,
            object_detector,
            face: face_analysis,
            verifier,
            guardian,
            capture,
        };

        Ok(Self {
            db_path,
            api_addr,
            api_token_path,
            camera,
            detect,
            face,
            embedding,
            evidence_store,
            generative_service,
            session,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("PROCTOR_DB_PATH") {
            if !v.trim().is_empty() {
                self.db_path = v;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_API_ADDR") {
            if !v.trim().is_empty() {
                self.api_addr = v;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_API_TOKEN_PATH") {
            if !v.trim().is_empty() {
                self.api_token_path = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_DETECT_BACKEND") {
            if !v.trim().is_empty() {
                self.detect.backend = BackendPreference::parse(&v)?;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_FACE_BACKEND") {
            if !v.trim().is_empty() {
                self.face.backend = BackendPreference::parse(&v)?;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_EVIDENCE_STORE_URL") {
            if !v.trim().is_empty() {
                self.evidence_store.base_url = v;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_EVIDENCE_STORE_TOKEN") {
            if !v.trim().is_empty() {
                self.evidence_store.auth_token = Some(v);
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_GENERATIVE_ENDPOINT") {
            if !v.trim().is_empty() {
                self.generative_service.endpoint = Some(v);
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_GENERATIVE_API_KEY") {
            if !v.trim().is_empty() {
                self.generative_service.api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_VERIFIER_THRESHOLD") {
            if !v.trim().is_empty() {
                self.session.verifier.threshold = v
                    .parse()
                    .map_err(|_| anyhow!("PROCTOR_VERIFIER_THRESHOLD must be a float"))?;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_OBJECT_CONFIDENCE_THRESHOLD") {
            if !v.trim().is_empty() {
                self.session.object_detector.confidence_threshold = v
                    .parse()
                    .map_err(|_| anyhow!("PROCTOR_OBJECT_CONFIDENCE_THRESHOLD must be a float"))?;
            }
        }
        if let Ok(v) = std::env::var("PROCTOR_MAX_ATTEMPTS") {
            if !v.trim().is_empty() {
                self.session.max_attempts = v
                    .parse()
                    .map_err(|_| anyhow!("PROCTOR_MAX_ATTEMPTS must be an integer"))?;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.session.validate()?;
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be greater than zero"));
        }
        if self.detect.backend == BackendPreference::Tract && self.detect.tract_model.is_none() {
            return Err(anyhow!("detect.backend=tract requires detect.tract_model to be set"));
        }
        if self.face.backend == BackendPreference::Tract && self.face.tract_model.is_none() {
            return Err(anyhow!("face.backend=tract requires face.tract_model to be set"));
        }
        Ok(())
    }
}

fn read_config_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;

    let cfg = if path.extension().map(|e| e == "toml").unwrap_or(false) {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid TOML config file {}: {}", path.display(), e))?
    } else if path.extension().map(|e| e == "json").unwrap_or(false) {
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid JSON config file {}: {}", path.display(), e))?
    } else {
        match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(json_err) => match toml::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(toml_err) => {
                    return Err(anyhow!(
                        "invalid config file {} (tried JSON and TOML): json error: {}; toml error: {}",
                        path.display(),
                        json_err,
                        toml_err
                    ));
                }
            },
        }
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn session_config_defaults_are_sane() {
        let cfg = SessionConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn session_config_rejects_unreasonably_low_object_confidence_threshold() {
        let cfg = SessionConfig {
            object_detector: ObjectDetectorConfig {
                confidence_threshold: 0.01,
                ..ObjectDetectorConfig::default()
            },
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn session_config_rejects_min_matches_above_frame_count() {
        let cfg = SessionConfig {
            verifier: VerifierConfig {
                frame_count: 3,
                min_matches: 4,
                ..VerifierConfig::default()
            },
            ..SessionConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_evidence_kinds_cover_object_and_verification_alerts() {
        let kinds = default_evidence_kinds();
        assert!(kinds.contains(&AlertKind::PhoneDetected));
        assert!(kinds.contains(&AlertKind::MultiPerson));
        assert!(kinds.contains(&AlertKind::FaceVerificationFailed));
        assert!(!kinds.contains(&AlertKind::TabSwitch));
    }

    #[test]
    fn detect_backend_tract_requires_model_path() {
        let mut cfg = ProctorConfig::from_file(ProctorConfigFile::default()).unwrap();
        cfg.detect.backend = BackendPreference::Tract;
        cfg.detect.tract_model = None;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn reads_toml_config_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "db_path = \"custom.db\"\n").unwrap();
        let file: ProctorConfigFile = read_config_file(&path).unwrap();
        assert_eq!(file.db_path.as_deref(), Some("custom.db"));
    }

    #[test]
    fn reads_json_config_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"db_path":"custom2.db"}"#).unwrap();
        let file: ProctorConfigFile = read_config_file(&path).unwrap();
        assert_eq!(file.db_path.as_deref(), Some("custom2.db"));
    }
}
