//! demo - end-to-end synthetic run for the proctoring kernel
//!
//! Spins up a `SessionSupervisor` over stub backends, starts a session,
//! pumps a handful of synthetic frames while injecting a couple of
//! browser-sourced environment events, submits, and prints the resulting
//! integrity report. No network, camera, or database dependency beyond a
//! scratch SQLite file in the output directory.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use proctor_kernel::camera::{CameraConfig, StubCameraSource};
use proctor_kernel::capture::InMemoryObjectStore;
use proctor_kernel::config::SessionConfig;
use proctor_kernel::detect::StubBackend;
use proctor_kernel::face::StubFaceBackend;
use proctor_kernel::guardian::AiGuardian;
use proctor_kernel::ledger::SqliteSessionLedger;
use proctor_kernel::signing_key_from_seed;
use proctor_kernel::supervisor::SessionSupervisor;
use proctor_kernel::ui::Ui;
use proctor_kernel::verifier::StubEmbeddingBackend;
use proctor_kernel::AlertKind;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic camera frames to pump through the pipeline.
    #[arg(long, default_value_t = 20)]
    frames: u32,
    /// Output directory for the scratch ledger database.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// Session identifier for this synthetic attempt.
    #[arg(long, default_value = "session:demo")]
    session_id: String,
    /// Force a specific UI mode (auto, plain, pretty).
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.frames == 0 {
        return Err(anyhow!("frames must be >= 1"));
    }

    let out_dir = PathBuf::from(&args.out);
    std::fs::create_dir_all(&out_dir)?;
    let db_path = out_dir.join("demo_ledger.db");

    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal(), false);

    let signing_key = {
        let _stage = ui.stage("derive device signing key");
        signing_key_from_seed("devkey:demo")?
    };

    let mut sup = {
        let _stage = ui.stage("open supervisor over stub backends");
        SessionSupervisor::new(
            Box::new(StubCameraSource::new(CameraConfig { width: 64, height: 48 })),
            Box::new(StubFaceBackend::new()),
            Box::new(StubBackend::new()),
            Box::new(StubEmbeddingBackend::new()),
            Box::new(InMemoryObjectStore::new()),
            Box::new(SqliteSessionLedger::open(db_path.to_str().ok_or_else(|| anyhow!("non-utf8 db path"))?)?),
            AiGuardian::new(),
            signing_key,
            SessionConfig::default(),
        )
    };

    {
        let _stage = ui.stage("start session and enroll identity");
        sup.start(&args.session_id, "exam:demo")?;
    }

    let mut fired_total = 0u64;
    {
        let _stage = ui.stage(&format!("pump {} synthetic frame(s)", args.frames));
        for i in 0..args.frames {
            let fired = sup.pump_frame(&args.session_id)?;
            fired_total += fired.len() as u64;

            // Inject a couple of synthetic browser-side signals partway
            // through the run, the same way the exam UI would over the C10
            // HTTP boundary.
            if i == args.frames / 2 {
                if sup
                    .log_event(&args.session_id, AlertKind::TabSwitch, BTreeMap::new(), None)?
                    .is_some()
                {
                    fired_total += 1;
                }
            }
            if i == args.frames - 1 {
                if sup
                    .log_event(&args.session_id, AlertKind::CopyPasteAttempt, BTreeMap::new(), None)?
                    .is_some()
                {
                    fired_total += 1;
                }
            }
        }
    }

    let report = {
        let _stage = ui.stage("submit and produce integrity report");
        sup.submit(&args.session_id)?
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!("demo: {} alert(s) fired across {} frame(s)", fired_total, args.frames);
    eprintln!("demo: ledger db at {}", db_path.display());
    eprintln!(
        "next: cargo run --bin ledger_verify -- --db {} --session-id {} --public-key-file <path>",
        db_path.display(),
        args.session_id
    );

    Ok(())
}
