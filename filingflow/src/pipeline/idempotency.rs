//! Idempotency guard for side-effecting steps.
//!
//! Re-running a step after a partial failure must not re-extract
//! duplicate rows or re-issue non-idempotent warehouse writes. The
//! guard records a marker before a step's side effects run and the
//! step's output once it commits; a later `begin` for the same
//! (step, run, fingerprint) replays the recorded success instead of
//! invoking the action again.

use crate::core::StepOutput;
use crate::errors::StepError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hashes the components of a step's logical inputs.
///
/// Fingerprints are content hashes (batch identifier, transform
/// version, upstream outputs), never timestamps, so equivalent re-runs
/// are recognized as duplicates.
#[must_use]
pub fn fingerprint(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join(":").as_bytes());
    let digest = hasher.finalize();
    format!("fp:{}", hex::encode(&digest[..16]))
}

/// Hashes a JSON value as a fingerprint component.
///
/// Maps inside the value must be order-stable (the crate's data maps
/// are `BTreeMap`-backed) for equal inputs to hash equally.
#[must_use]
pub fn fingerprint_json(value: &serde_json::Value) -> String {
    fingerprint(&[&value.to_string()])
}

/// Identifies one logical application of a step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// The step name.
    pub step: String,
    /// The run the step belongs to.
    pub run_id: Uuid,
    /// Content fingerprint of the step's logical inputs.
    pub fingerprint: String,
}

impl IdempotencyKey {
    /// Creates a key.
    #[must_use]
    pub fn new(step: impl Into<String>, run_id: Uuid, fingerprint: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            run_id,
            fingerprint: fingerprint.into(),
        }
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.run_id, self.step, self.fingerprint)
    }
}

/// A committed step application: the recorded success to replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedRecord {
    /// The output the step produced.
    pub output: StepOutput,
    /// How many attempts the original execution took.
    pub attempts: u32,
    /// When the application was committed.
    pub committed_at: DateTime<Utc>,
}

impl AppliedRecord {
    /// Creates a record committed now.
    #[must_use]
    pub fn new(output: StepOutput, attempts: u32) -> Self {
        Self {
            output,
            attempts,
            committed_at: Utc::now(),
        }
    }
}

/// Proof that `begin` placed an in-flight marker; spent by `commit` or
/// `abort`.
#[derive(Debug)]
pub struct IdempotencyToken {
    key: IdempotencyKey,
}

impl IdempotencyToken {
    /// Returns the key the token was issued for.
    #[must_use]
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }
}

/// Result of consulting the guard before running a step.
#[derive(Debug)]
pub enum BeginOutcome {
    /// No prior application; the action should run. Commit or abort the
    /// token afterwards.
    Fresh(IdempotencyToken),
    /// The step was already applied with these inputs; replay the
    /// recorded success without invoking the action.
    AlreadyApplied(AppliedRecord),
}

/// Storage seam for idempotency records.
///
/// Production deployments back this with the warehouse's own metadata
/// tables so markers survive a process restart; the in-memory store
/// covers tests and single-process runs.
#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Places an in-flight marker, or reports a prior application.
    async fn begin(&self, key: IdempotencyKey) -> Result<BeginOutcome, StepError>;

    /// Marks the application complete, recording the output to replay.
    async fn commit(&self, token: IdempotencyToken, record: AppliedRecord)
        -> Result<(), StepError>;

    /// Releases the in-flight marker so a retry can re-attempt.
    async fn abort(&self, token: IdempotencyToken) -> Result<(), StepError>;
}

#[derive(Debug, Clone)]
enum Entry {
    InFlight,
    Committed(AppliedRecord),
}

/// In-memory idempotency store.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryIdempotencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries (in-flight and committed).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyStore {
    async fn begin(&self, key: IdempotencyKey) -> Result<BeginOutcome, StepError> {
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => match occupied.get() {
                Entry::Committed(record) => Ok(BeginOutcome::AlreadyApplied(record.clone())),
                Entry::InFlight => Err(StepError::transient(format!(
                    "application '{key}' is already in flight"
                ))),
            },
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry::InFlight);
                Ok(BeginOutcome::Fresh(IdempotencyToken { key }))
            }
        }
    }

    async fn commit(
        &self,
        token: IdempotencyToken,
        record: AppliedRecord,
    ) -> Result<(), StepError> {
        self.entries
            .insert(token.key.to_string(), Entry::Committed(record));
        Ok(())
    }

    async fn abort(&self, token: IdempotencyToken) -> Result<(), StepError> {
        let storage_key = token.key.to_string();
        // Never clobber a committed record with an abort.
        self.entries
            .remove_if(&storage_key, |_, entry| matches!(entry, Entry::InFlight));
        Ok(())
    }
}
