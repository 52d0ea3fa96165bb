//! Collection manifest and SHA-256 hash over the collected records.

use crate::collect::{Collection, Record, RecordKind, TimeWindow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Written next to every exported records file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionManifest {
    pub version: u32,
    pub address: String,
    pub chain: String,
    pub kind: RecordKind,
    pub window: Option<TimeWindow>,
    pub record_count: usize,
    pub pages: u32,
    pub requests: u64,
    /// False when the collection stopped early.
    pub complete: bool,
    pub error: Option<String>,
    pub created_utc_rfc3339: String,
    pub records_sha256: String,
}

impl CollectionManifest {
    pub fn from_collection(collection: &Collection) -> Result<Self, VerifyError> {
        let created_utc_rfc3339 = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Ok(Self {
            version: MANIFEST_VERSION,
            address: collection.query.address.clone(),
            chain: collection.query.chain.clone(),
            kind: collection.query.kind,
            window: collection.query.time_window,
            record_count: collection.records.len(),
            pages: collection.pages,
            requests: collection.requests,
            complete: collection.is_complete(),
            error: collection.error.as_ref().map(ToString::to_string),
            created_utc_rfc3339,
            records_sha256: records_hash(&collection.records)?,
        })
    }
}

/// Normalize JSON for hashing: sorted keys, no whitespace.
pub fn normalize_for_hash(value: &serde_json::Value) -> Result<String, VerifyError> {
    Ok(serde_json::to_string(&sort_json_keys(value))?)
}

fn sort_json_keys(v: &serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(m) => {
            let sorted: std::collections::BTreeMap<&String, serde_json::Value> =
                m.iter().map(|(k, v)| (k, sort_json_keys(v))).collect();
            serde_json::Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), v))
                    .collect(),
            )
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 over the normalized record array. Order matters; key order inside a record does not.
pub fn records_hash(records: &[Record]) -> Result<String, VerifyError> {
    let json = serde_json::to_value(records)?;
    let normalized = normalize_for_hash(&json)?;
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub records_hash: String,
    pub expected_hash: String,
    pub count_matches: bool,
    pub matches: bool,
}

/// Check records read back from disk against their manifest.
pub fn verify_manifest(
    manifest: &CollectionManifest,
    records: &[Record],
) -> Result<VerificationResult, VerifyError> {
    let records_hash = records_hash(records)?;
    let expected_hash = manifest.records_sha256.trim().to_lowercase();
    let count_matches = manifest.record_count == records.len();
    Ok(VerificationResult {
        matches: count_matches && records_hash == expected_hash,
        records_hash,
        expected_hash,
        count_matches,
    })
}
