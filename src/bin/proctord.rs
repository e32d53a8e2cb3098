//! proctord - proctoring kernel daemon
//!
//! This daemon:
//! 1. Loads layered configuration (defaults, config file, environment).
//! 2. Starts one candidate's exam attempt and acquires the camera.
//! 3. Runs the frame pump loop: capture, face/object inference, fusion,
//!    throttling, evidence capture, and session-ledger append.
//! 4. Serves the session lifecycle HTTP API (C10) alongside the pump loop.
//! 5. Submits (or auto-submits on shutdown) and prints the integrity report.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proctor_kernel::api::{ApiConfig, ApiServer};
use proctor_kernel::camera::{CameraConfig, CameraSource, StubCameraSource};
use proctor_kernel::capture::{HttpObjectStore, InMemoryObjectStore, ObjectStore};
use proctor_kernel::config::{BackendPreference, ProctorConfig};
use proctor_kernel::detect::{DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
use proctor_kernel::detect::TractBackend;
use proctor_kernel::face::{FaceLandmarkBackend, StubFaceBackend};
#[cfg(feature = "backend-tract")]
use proctor_kernel::face::TractFaceBackend;
use proctor_kernel::guardian::{AiGuardian, UreqGenerativeTextService};
use proctor_kernel::ledger::SqliteSessionLedger;
use proctor_kernel::supervisor::SessionSupervisor;
use proctor_kernel::verifier::{EmbeddingBackend, StubEmbeddingBackend};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Session identifier for this attempt.
    #[arg(long, default_value = "session:local")]
    session_id: String,
    /// Exam identifier, scopes the max-attempts counter.
    #[arg(long, default_value = "exam:local")]
    exam_id: String,
}

fn build_detect_backend(cfg: &ProctorConfig) -> Result<Box<dyn DetectorBackend>> {
    match cfg.detect.backend {
        BackendPreference::Stub => Ok(Box::new(StubBackend::new())),
        BackendPreference::Auto if cfg.detect.tract_model.is_none() => Ok(Box::new(StubBackend::new())),
        #[cfg(feature = "backend-tract")]
        BackendPreference::Tract | BackendPreference::Auto => {
            let path = cfg
                .detect
                .tract_model
                .as_ref()
                .ok_or_else(|| anyhow!("detect.tract_model is required for the tract backend"))?;
            Ok(Box::new(TractBackend::new(
                path,
                cfg.session.object_detector.confidence_threshold,
                cfg.session.object_detector.force_sigmoid,
            )?))
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendPreference::Tract | BackendPreference::Auto => {
            Err(anyhow!("tract backend requested but crate built without backend-tract"))
        }
    }
}

fn build_face_backend(cfg: &ProctorConfig) -> Result<Box<dyn FaceLandmarkBackend>> {
    match cfg.face.backend {
        BackendPreference::Stub => Ok(Box::new(StubFaceBackend::new())),
        BackendPreference::Auto if cfg.face.tract_model.is_none() => Ok(Box::new(StubFaceBackend::new())),
        #[cfg(feature = "backend-tract")]
        BackendPreference::Tract | BackendPreference::Auto => {
            let path = cfg
                .face
                .tract_model
                .as_ref()
                .ok_or_else(|| anyhow!("face.tract_model is required for the tract backend"))?;
            Ok(Box::new(TractFaceBackend::new(path, cfg.camera.width, cfg.camera.height)?))
        }
        #[cfg(not(feature = "backend-tract"))]
        BackendPreference::Tract | BackendPreference::Auto => {
            Err(anyhow!("tract backend requested but crate built without backend-tract"))
        }
    }
}

fn build_embedding_backend(_cfg: &ProctorConfig) -> Result<Box<dyn EmbeddingBackend>> {
    // The embedding backend shares the tract ONNX runtime but has no
    // dedicated model-loading implementation yet; degrade to the
    // deterministic stub rather than abort the daemon (§7: degrade, don't
    // abort, when an optional ML surface is unavailable).
    Ok(Box::new(StubEmbeddingBackend::new()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = ProctorConfig::load()?;

    let seed_path = proctor_kernel::crypto::device_key_path_for_db(&config.db_path)?;
    let signing_key_seed = proctor_kernel::crypto::load_or_create_device_seed(&seed_path, None)?;
    let signing_key = proctor_kernel::signing_key_from_seed(&signing_key_seed)?;

    let camera: Box<dyn CameraSource> = Box::new(StubCameraSource::new(CameraConfig {
        width: config.camera.width,
        height: config.camera.height,
    }));
    let detect_backend = build_detect_backend(&config)?;
    let face_backend = build_face_backend(&config)?;
    let embedding_backend = build_embedding_backend(&config)?;

    let object_store: Box<dyn ObjectStore> = if config.evidence_store.base_url.is_empty() {
        Box::new(InMemoryObjectStore::new())
    } else {
        Box::new(HttpObjectStore::new(
            config.evidence_store.base_url.clone(),
            config.evidence_store.auth_token.clone(),
        ))
    };
    let ledger = Box::new(SqliteSessionLedger::open(&config.db_path)?);

    let mut guardian = AiGuardian::new();
    if let Some(endpoint) = config.generative_service.endpoint.clone() {
        let api_key = config.generative_service.api_key.clone().unwrap_or_default();
        guardian = guardian.with_generative_service(Arc::new(UreqGenerativeTextService::new(endpoint, api_key)));
    }

    let supervisor = Arc::new(Mutex::new(SessionSupervisor::new(
        camera,
        face_backend,
        detect_backend,
        embedding_backend,
        object_store,
        ledger,
        guardian,
        signing_key,
        config.session.clone(),
    )));

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        token_path: config.api_token_path.clone(),
    };
    let api_handle = ApiServer::new(api_config, supervisor.clone()).spawn()?;
    log::info!("session api listening on {}", api_handle.addr);
    if let Some(path) = &api_handle.token_path {
        log::info!("session api bearer token written to {}", path.display());
    } else {
        log::warn!("session api bearer token (handle securely): {}", api_handle.token);
    }

    {
        let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
        sup.start(&args.session_id, &args.exam_id)?;
    }
    log::info!("proctord running. session={} exam={}", args.session_id, args.exam_id);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let frame_interval = Duration::from_millis(1000 / config.camera.target_fps.max(1) as u64);
    let mut last_reverify = Instant::now();

    loop {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received");
            break;
        }

        {
            let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            if sup.state(&args.session_id).map(|s| s.is_terminal()).unwrap_or(true) {
                break;
            }

            match sup.pump_frame(&args.session_id) {
                Ok(fired) => {
                    for event in fired {
                        log::info!("alert: {:?} severity={:?} seq={}", event.kind, event.severity, event.sequence);
                    }
                }
                Err(e) => log::warn!("frame pump tick failed: {}", e),
            }

            if last_reverify.elapsed() > Duration::from_secs(30) {
                match sup.reverify_identity(&args.session_id) {
                    Ok(verified) => log::debug!("periodic re-verification: verified={}", verified),
                    Err(e) => log::warn!("periodic re-verification failed: {}", e),
                }
                last_reverify = Instant::now();
            }
        }

        std::thread::sleep(frame_interval);
    }

    let report = {
        let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
        sup.auto_submit(&args.session_id)?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    api_handle.stop()?;
    Ok(())
}
