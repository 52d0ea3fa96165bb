//! Collection manifests and record hashing for re-checking exported files.

mod manifest;

pub use manifest::{
    normalize_for_hash, records_hash, verify_manifest, CollectionManifest, VerificationResult,
    VerifyError,
};
