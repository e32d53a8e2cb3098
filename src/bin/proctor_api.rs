//! proctor_api - API-only service for the proctoring kernel
//!
//! Serves the session lifecycle HTTP API (C10) without running its own
//! frame pump loop. Useful when frame ingestion happens out of process
//! (e.g. a browser-facing gateway posting frames elsewhere) and this
//! process only needs to own session lifecycle, the ledger, and the
//! integrity report.

use anyhow::{anyhow, Result};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use proctor_kernel::api::{ApiConfig, ApiServer};
use proctor_kernel::camera::{CameraConfig, StubCameraSource};
use proctor_kernel::capture::{HttpObjectStore, InMemoryObjectStore, ObjectStore};
use proctor_kernel::config::ProctorConfig;
use proctor_kernel::detect::StubBackend;
use proctor_kernel::face::StubFaceBackend;
use proctor_kernel::guardian::{AiGuardian, UreqGenerativeTextService};
use proctor_kernel::ledger::SqliteSessionLedger;
use proctor_kernel::supervisor::SessionSupervisor;
use proctor_kernel::verifier::StubEmbeddingBackend;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ProctorConfig::load()?;

    let seed_path = proctor_kernel::crypto::device_key_path_for_db(&config.db_path)?;
    let signing_key_seed = proctor_kernel::crypto::load_or_create_device_seed(&seed_path, None)?;
    let signing_key = proctor_kernel::signing_key_from_seed(&signing_key_seed)?;

    // No camera attached to this process; frame ingestion is external.
    let camera = Box::new(StubCameraSource::new(CameraConfig {
        width: config.camera.width,
        height: config.camera.height,
    }));

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
        Box::new(StubFaceBackend::new()),
        Box::new(StubBackend::new()),
        Box::new(StubEmbeddingBackend::new()),
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
    let api_handle = ApiServer::new(api_config, supervisor).spawn()?;
    log::info!("session api listening on {}", api_handle.addr);
    if let Some(path) = &api_handle.token_path {
        log::info!("session api bearer token written to {}", path.display());
    } else {
        log::warn!("session api bearer token (handle securely): {}", api_handle.token);
    }
    log::info!("proctor_api running. serving {}", config.db_path);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("proctor_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop().map_err(|e| anyhow!("failed to stop api server: {}", e))?;

    Ok(())
}
