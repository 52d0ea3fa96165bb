//! Batch runs over many address/chain/kind combinations with per-query outcomes.

use crate::chain::lookback_window;
use crate::collect::{Collection, Collector, Query, RecordKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("targets file: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_kinds() -> Vec<RecordKind> {
    RecordKind::ALL.to_vec()
}

/// One entry of a targets file: a labelled contract on one or more chains.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub label: String,
    pub address: String,
    pub chains: Vec<String>,
    #[serde(default = "default_kinds")]
    pub kinds: Vec<RecordKind>,
    /// Lookback in days; 0 or missing means full history.
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub topic0: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl BatchTarget {
    /// Expand into one query per chain and kind, in file order.
    pub fn queries(&self, now: OffsetDateTime) -> Vec<Query> {
        let window = lookback_window(self.days, now);
        let mut out = Vec::with_capacity(self.chains.len() * self.kinds.len());
        for chain in &self.chains {
            for kind in &self.kinds {
                let mut q = Query::new(self.address.clone(), chain.clone(), *kind);
                if let Some(w) = window {
                    q = q.with_time_window(w);
                }
                if let Some(size) = self.page_size {
                    q = q.with_page_size(size);
                }
                if let (RecordKind::Event, Some(topic0)) = (kind, &self.topic0) {
                    q = q.with_topic0(topic0.clone());
                }
                out.push(q);
            }
        }
        out
    }
}

/// Read a JSON array of targets.
pub fn load_targets(path: impl AsRef<std::path::Path>) -> Result<Vec<BatchTarget>, BatchError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Summary line for one query of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub label: String,
    pub address: String,
    pub chain: String,
    pub kind: RecordKind,
    pub retrieved: usize,
    pub pages: u32,
    pub requests: u64,
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn from_collection(label: &str, c: &Collection) -> Self {
        Self {
            label: label.to_string(),
            address: c.query.address.clone(),
            chain: c.query.chain.clone(),
            kind: c.query.kind,
            retrieved: c.records.len(),
            pages: c.pages,
            requests: c.requests,
            error: c.error.as_ref().map(ToString::to_string),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<QueryOutcome>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &QueryOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn total_records(&self) -> usize {
        self.outcomes.iter().map(|o| o.retrieved).sum()
    }

    /// True only when there was work and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| !o.succeeded())
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(|o| {
                let status = match &o.error {
                    None => "ok".to_string(),
                    Some(e) => format!("FAILED: {e}"),
                };
                format!(
                    "{}\t{}\t{}\t{}\t{} records\t{} pages\t{} requests\t{}",
                    o.label, o.chain, o.address, o.kind, o.retrieved, o.pages, o.requests, status
                )
            })
            .collect()
    }
}

/// Run every target's queries in sequence. A failed query never stops the batch;
/// `on_collection` sees each finished collection (e.g. to write it to disk).
/// Windowed event queries are first narrowed to an estimated block range.
pub async fn run_batch(
    collector: &Collector,
    targets: &[BatchTarget],
    now: OffsetDateTime,
    mut on_collection: impl FnMut(&BatchTarget, &Collection),
) -> BatchReport {
    let mut report = BatchReport::default();
    for target in targets {
        for query in target.queries(now) {
            let query = collector.narrow_block_range(query, now).await;
            let collection = collector.collect(&query).await;
            on_collection(target, &collection);
            report
                .outcomes
                .push(QueryOutcome::from_collection(&target.label, &collection));
        }
    }
    info!(
        queries = report.outcomes.len(),
        failed = report.failed().count(),
        records = report.total_records(),
        "batch complete"
    );
    report
}
