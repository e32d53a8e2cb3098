//! Session ledger (C6): an append-only, hash-chained, signed event log. One
//! hash chain per session; `prev_hash` for a session's first entry is all
//! zeros. Grounded on the sealed-event-log idiom (hash chain + checkpointed
//! SQLite table + in-memory test twin) but generalized from a single global
//! chain to one chain per session, with idempotency-token dedup and
//! timestamp-monotonicity repair added per the session-lifecycle model this
//! ledger now serves.

use std::collections::HashMap;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rusqlite::{params, Connection};

use crate::{hash_entry, sign_entry, verify_entry_signature, AlertKind, EventSource, Event, EvidenceHandle, LedgerError, Severity};

pub trait SessionLedger: Send {
    /// Appends a new event to `session_id`'s chain, returning the assigned
    /// sequence number. If `idempotency_token` matches a token already
    /// recorded for this session, the existing sequence number is returned
    /// without appending a duplicate entry.
    #[allow(clippy::too_many_arguments)]
    fn append(
        &mut self,
        session_id: &str,
        kind: AlertKind,
        severity: Severity,
        details: std::collections::BTreeMap<String, String>,
        evidence_handle: Option<EvidenceHandle>,
        source: EventSource,
        timestamp_ms: u64,
        idempotency_token: Option<String>,
        signing_key: &SigningKey,
    ) -> Result<u64, LedgerError>;

    fn events_for_session(&mut self, session_id: &str) -> Result<Vec<Event>, LedgerError>;

    /// Re-walks a session's hash chain and verifies every signature,
    /// returning an error at the first broken link (used by `ledger_verify`
    /// and by the universal "every sealed event verifies" test property).
    fn verify_chain(&mut self, session_id: &str, verifying_key: &VerifyingKey) -> Result<(), LedgerError>;
}

#[derive(Clone, Debug)]
struct StoredEntry {
    event: Event,
    prev_hash: [u8; 32],
    entry_hash: [u8; 32],
    signature: [u8; 64],
}

#[derive(Default)]
struct ChainState {
    last_hash: [u8; 32],
    last_timestamp_ms: u64,
    next_sequence: u64,
    seen_tokens: HashMap<String, u64>,
}

fn repair_timestamp(requested_ms: u64, last_timestamp_ms: u64) -> u64 {
    if requested_ms > last_timestamp_ms {
        requested_ms
    } else {
        last_timestamp_ms + 1
    }
}

pub struct InMemorySessionLedger {
    chains: HashMap<String, ChainState>,
    entries: HashMap<String, Vec<StoredEntry>>,
}

impl InMemorySessionLedger {
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
            entries: HashMap::new(),
        }
    }
}

impl Default for InMemorySessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLedger for InMemorySessionLedger {
    fn append(
        &mut self,
        session_id: &str,
        kind: AlertKind,
        severity: Severity,
        details: std::collections::BTreeMap<String, String>,
        evidence_handle: Option<EvidenceHandle>,
        source: EventSource,
        timestamp_ms: u64,
        idempotency_token: Option<String>,
        signing_key: &SigningKey,
    ) -> Result<u64, LedgerError> {
        let chain = self.chains.entry(session_id.to_string()).or_default();

        if let Some(token) = &idempotency_token {
            if let Some(existing_seq) = chain.seen_tokens.get(token) {
                return Ok(*existing_seq);
            }
        }

        let sequence = chain.next_sequence;
        let timestamp_ms = repair_timestamp(timestamp_ms, chain.last_timestamp_ms);

        let event = Event {
            session_id: session_id.to_string(),
            sequence,
            kind,
            severity,
            details,
            evidence_handle,
            timestamp_ms,
            source,
            idempotency_token: idempotency_token.clone(),
        };

        let payload_json = serde_json::to_string(&event)
            .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
        let prev_hash = chain.last_hash;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());
        let signature = sign_entry(signing_key, &entry_hash);

        chain.last_hash = entry_hash;
        chain.last_timestamp_ms = timestamp_ms;
        chain.next_sequence += 1;
        if let Some(token) = idempotency_token {
            chain.seen_tokens.insert(token, sequence);
        }

        self.entries.entry(session_id.to_string()).or_default().push(StoredEntry {
            event,
            prev_hash,
            entry_hash,
            signature,
        });

        Ok(sequence)
    }

    fn events_for_session(&mut self, session_id: &str) -> Result<Vec<Event>, LedgerError> {
        Ok(self
            .entries
            .get(session_id)
            .map(|entries| entries.iter().map(|e| e.event.clone()).collect())
            .unwrap_or_default())
    }

    fn verify_chain(&mut self, session_id: &str, verifying_key: &VerifyingKey) -> Result<(), LedgerError> {
        let mut expected_prev = [0u8; 32];
        for entry in self.entries.get(session_id).into_iter().flatten() {
            if entry.prev_hash != expected_prev {
                return Err(LedgerError::InternalInconsistency(format!(
                    "chain break at sequence {}",
                    entry.event.sequence
                )));
            }
            verify_entry_signature(verifying_key, &entry.entry_hash, &entry.signature)
                .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
            expected_prev = entry.entry_hash;
        }
        Ok(())
    }
}

pub struct SqliteSessionLedger {
    conn: Connection,
}

impl SqliteSessionLedger {
    pub fn open(db_path: &str) -> Result<Self, LedgerError> {
        let conn = Connection::open(db_path).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<(), LedgerError> {
        self.conn
            .execute_batch(
                r#"
                PRAGMA journal_mode=WAL;

                CREATE TABLE IF NOT EXISTS session_events (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  session_id TEXT NOT NULL,
                  sequence INTEGER NOT NULL,
                  payload_json TEXT NOT NULL,
                  prev_hash BLOB NOT NULL,
                  entry_hash BLOB NOT NULL,
                  signature BLOB NOT NULL,
                  idempotency_token TEXT,
                  UNIQUE(session_id, sequence)
                );

                CREATE INDEX IF NOT EXISTS idx_session_events_session ON session_events(session_id);
                CREATE INDEX IF NOT EXISTS idx_session_events_token ON session_events(session_id, idempotency_token);
                "#,
            )
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        Ok(())
    }

    fn chain_tail(&self, session_id: &str) -> Result<([u8; 32], u64, u64), LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT entry_hash, sequence, payload_json FROM session_events WHERE session_id = ?1 ORDER BY sequence DESC LIMIT 1")
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let mut rows = stmt
            .query(params![session_id])
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        if let Some(row) = rows.next().map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))? {
            let hash_bytes: Vec<u8> = row.get(0).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let sequence: i64 = row.get(1).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let payload_json: String = row.get(2).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            if hash_bytes.len() != 32 {
                return Err(LedgerError::InternalInconsistency("corrupt entry_hash".into()));
            }
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&hash_bytes);
            let last_event: Event = serde_json::from_str(&payload_json)
                .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
            Ok((hash, sequence as u64 + 1, last_event.timestamp_ms))
        } else {
            Ok(([0u8; 32], 0, 0))
        }
    }

    fn existing_sequence_for_token(&self, session_id: &str, token: &str) -> Result<Option<u64>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT sequence FROM session_events WHERE session_id = ?1 AND idempotency_token = ?2 LIMIT 1")
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let mut rows = stmt
            .query(params![session_id, token])
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        if let Some(row) = rows.next().map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))? {
            let sequence: i64 = row.get(0).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            Ok(Some(sequence as u64))
        } else {
            Ok(None)
        }
    }
}

impl SessionLedger for SqliteSessionLedger {
    fn append(
        &mut self,
        session_id: &str,
        kind: AlertKind,
        severity: Severity,
        details: std::collections::BTreeMap<String, String>,
        evidence_handle: Option<EvidenceHandle>,
        source: EventSource,
        timestamp_ms: u64,
        idempotency_token: Option<String>,
        signing_key: &SigningKey,
    ) -> Result<u64, LedgerError> {
        if let Some(token) = &idempotency_token {
            if let Some(existing) = self.existing_sequence_for_token(session_id, token)? {
                return Ok(existing);
            }
        }

        let (prev_hash, sequence, last_timestamp_ms) = self.chain_tail(session_id)?;
        let timestamp_ms = repair_timestamp(timestamp_ms, last_timestamp_ms);

        let event = Event {
            session_id: session_id.to_string(),
            sequence,
            kind,
            severity,
            details,
            evidence_handle,
            timestamp_ms,
            source,
            idempotency_token: idempotency_token.clone(),
        };
        let payload_json = serde_json::to_string(&event)
            .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
        let entry_hash = hash_entry(&prev_hash, payload_json.as_bytes());
        let signature = sign_entry(signing_key, &entry_hash);

        self.conn
            .execute(
                r#"
                INSERT INTO session_events(session_id, sequence, payload_json, prev_hash, entry_hash, signature, idempotency_token)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    session_id,
                    sequence as i64,
                    payload_json,
                    prev_hash.to_vec(),
                    entry_hash.to_vec(),
                    signature.to_vec(),
                    idempotency_token,
                ],
            )
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;

        Ok(sequence)
    }

    fn events_for_session(&mut self, session_id: &str) -> Result<Vec<Event>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload_json FROM session_events WHERE session_id = ?1 ORDER BY sequence ASC")
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![session_id], |row| row.get::<_, String>(0))
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let payload = row.map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let event: Event = serde_json::from_str(&payload)
                .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
            out.push(event);
        }
        Ok(out)
    }

    fn verify_chain(&mut self, session_id: &str, verifying_key: &VerifyingKey) -> Result<(), LedgerError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT sequence, payload_json, prev_hash, entry_hash, signature FROM session_events \
                 WHERE session_id = ?1 ORDER BY sequence ASC",
            )
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
        let mut rows = stmt
            .query(params![session_id])
            .map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;

        let mut expected_prev = [0u8; 32];
        while let Some(row) = rows.next().map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))? {
            let sequence: i64 = row.get(0).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let prev_hash_bytes: Vec<u8> = row.get(2).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let entry_hash_bytes: Vec<u8> = row.get(3).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;
            let sig_bytes: Vec<u8> = row.get(4).map_err(|e| LedgerError::LedgerUnavailable(e.to_string()))?;

            if prev_hash_bytes.len() != 32 || entry_hash_bytes.len() != 32 || sig_bytes.len() != 64 {
                return Err(LedgerError::InternalInconsistency(format!(
                    "corrupt row at sequence {sequence}"
                )));
            }
            let mut prev_hash = [0u8; 32];
            prev_hash.copy_from_slice(&prev_hash_bytes);
            let mut entry_hash = [0u8; 32];
            entry_hash.copy_from_slice(&entry_hash_bytes);
            let mut signature = [0u8; 64];
            signature.copy_from_slice(&sig_bytes);

            if prev_hash != expected_prev {
                return Err(LedgerError::InternalInconsistency(format!(
                    "chain break at sequence {sequence}"
                )));
            }
            verify_entry_signature(verifying_key, &entry_hash, &signature)
                .map_err(|e| LedgerError::InternalInconsistency(e.to_string()))?;
            expected_prev = entry_hash;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing_key_from_seed;
    use std::collections::BTreeMap;

    #[test]
    fn in_memory_chain_verifies_and_tolerates_duplicate_tokens() {
        let key = signing_key_from_seed("devkey:ledger-test").unwrap();
        let mut ledger = InMemorySessionLedger::new();

        let seq1 = ledger
            .append(
                "sess-1",
                AlertKind::PhoneDetected,
                Severity::Warning,
                BTreeMap::new(),
                None,
                EventSource::ObjectDetector,
                100,
                Some("tok-a".to_string()),
                &key,
            )
            .unwrap();
        let seq1_again = ledger
            .append(
                "sess-1",
                AlertKind::PhoneDetected,
                Severity::Warning,
                BTreeMap::new(),
                None,
                EventSource::ObjectDetector,
                100,
                Some("tok-a".to_string()),
                &key,
            )
            .unwrap();
        assert_eq!(seq1, seq1_again);

        ledger
            .append(
                "sess-1",
                AlertKind::LookingAway,
                Severity::Warning,
                BTreeMap::new(),
                None,
                EventSource::FaceAnalyzer,
                50,
                None,
                &key,
            )
            .unwrap();

        let events = ledger.events_for_session("sess-1").unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].timestamp_ms > events[0].timestamp_ms, "timestamp monotonicity repaired");

        ledger.verify_chain("sess-1", &key.verifying_key()).unwrap();
    }

    #[test]
    fn sessions_have_independent_chains() {
        let key = signing_key_from_seed("devkey:ledger-test-2").unwrap();
        let mut ledger = InMemorySessionLedger::new();
        ledger
            .append("a", AlertKind::TabSwitch, Severity::Warning, BTreeMap::new(), None, EventSource::Environment, 1, None, &key)
            .unwrap();
        let seq = ledger
            .append("b", AlertKind::TabSwitch, Severity::Warning, BTreeMap::new(), None, EventSource::Environment, 1, None, &key)
            .unwrap();
        assert_eq!(seq, 0, "session b's chain starts fresh regardless of session a's history");
    }
}
