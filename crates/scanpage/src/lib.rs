//! scanpage: complete address histories from Etherscan-family explorer APIs.
//!
//! Pages through transaction, internal-transaction and event-log endpoints past the
//! per-request cap, with a minimum request interval, bounded retries with exponential
//! backoff, and per-query error containment. Read-only.

pub mod batch;
pub mod chain;
pub mod collect;
pub mod provider;
pub mod verify;

pub use batch::{run_batch, BatchReport, BatchTarget, QueryOutcome};
pub use chain::{Cache, Chain, ChainTable, Endpoint, FetchConfig, Fetcher, RateLimiter};
pub use collect::{
    BlockRange, CollectError, Collection, CollectionError, Collector, Query, Record, RecordKind,
    SortOrder, TimeWindow,
};
pub use provider::{EtherscanAdapter, PageAdapter, PageSignal};
pub use verify::{records_hash, verify_manifest, CollectionManifest, VerificationResult};
