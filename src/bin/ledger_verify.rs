//! ledger_verify - external verifier for a session ledger's integrity
//!
//! This tool proves, without trusting the running daemon:
//! - A session's event chain is hash-chained (tamper-evident)
//! - Each entry is signed by the device key (Ed25519)

use anyhow::{anyhow, Result};
use clap::Parser;
use ed25519_dalek::VerifyingKey;

use proctor_kernel::ledger::SessionLedger;
use proctor_kernel::ledger::SqliteSessionLedger;

#[derive(Parser, Debug)]
#[command(name = "ledger_verify", about = "Verify a proctoring session's ledger hash-chain and signatures")]
struct Args {
    /// Path to the proctoring SQLite database.
    #[arg(long, default_value = "proctor.db")]
    db: String,

    /// Session id to verify.
    #[arg(long)]
    session_id: String,

    /// Device public key (hex-encoded Ed25519 verifying key).
    #[arg(long, value_name = "HEX", conflicts_with = "public_key_file")]
    public_key: Option<String>,

    /// Path to file containing hex-encoded device public key.
    #[arg(long, value_name = "PATH", conflicts_with = "public_key")]
    public_key_file: Option<String>,

    /// Verbose output (prints every event's kind and sequence).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let public_key_hex = match (&args.public_key, &args.public_key_file) {
        (Some(hex), _) => hex.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read public key file {}: {}", path, e))?
            .trim()
            .to_string(),
        (None, None) => return Err(anyhow!("one of --public-key or --public-key-file is required")),
    };
    let verifying_key = verifying_key_from_hex(&public_key_hex)?;

    let mut ledger = SqliteSessionLedger::open(&args.db)?;
    println!("ledger_verify: checking session '{}' in {}", args.session_id, args.db);

    let events = ledger.events_for_session(&args.session_id)?;
    if events.is_empty() {
        println!("no events recorded for this session");
        return Ok(());
    }

    ledger.verify_chain(&args.session_id, &verifying_key)?;

    if args.verbose {
        for event in &events {
            println!("  event {}: {:?} severity={:?} @ {}", event.sequence, event.kind, event.severity, event.timestamp_ms);
        }
    }

    println!("OK: {} event(s) verified, chain intact.", events.len());
    Ok(())
}

fn verifying_key_from_hex(hex_str: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| anyhow!("invalid hex: {}", e))?;
    if bytes.len() != 32 {
        return Err(anyhow!("invalid public key length: expected 32 bytes, got {}", bytes.len()));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);
    VerifyingKey::from_bytes(&key_bytes).map_err(|e| anyhow!("invalid public key bytes: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_kernel::signing_key_from_seed;

    #[test]
    fn verifying_key_from_hex_rejects_wrong_length() {
        let result = verifying_key_from_hex("deadbeef");
        assert!(result.is_err());
    }

    #[test]
    fn verifying_key_from_hex_accepts_valid_key() {
        let key = signing_key_from_seed("devkey:ledger-verify-test").unwrap();
        let hex_str = hex::encode(key.verifying_key().to_bytes());
        assert!(verifying_key_from_hex(&hex_str).is_ok());
    }
}
