//! Query description: what to collect, for which address and chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper block bound used when the caller gives none.
pub const DEFAULT_END_BLOCK: u64 = 99_999_999;
pub const MAX_TX_PAGE_SIZE: u32 = 10_000;
pub const MAX_LOG_PAGE_SIZE: u32 = 1_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Transaction,
    InternalTransaction,
    Event,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Transaction,
        RecordKind::InternalTransaction,
        RecordKind::Event,
    ];

    pub fn max_page_size(self) -> u32 {
        match self {
            RecordKind::Transaction | RecordKind::InternalTransaction => MAX_TX_PAGE_SIZE,
            RecordKind::Event => MAX_LOG_PAGE_SIZE,
        }
    }

    /// Label used in output file names.
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Transaction => "transactions",
            RecordKind::InternalTransaction => "internal_txs",
            RecordKind::Event => "events",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tx" | "txs" | "transaction" | "transactions" => Ok(RecordKind::Transaction),
            "internal" | "internal_txs" | "internal_transaction" | "internal_transactions" => {
                Ok(RecordKind::InternalTransaction)
            }
            "event" | "events" | "log" | "logs" => Ok(RecordKind::Event),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Inclusive wall-clock window in Unix seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Whole days covered, rounded up.
    pub fn span_days(&self) -> u32 {
        let secs = (self.end - self.start).max(0);
        u32::try_from((secs + 86_399) / 86_400).unwrap_or(u32::MAX)
    }
}

/// Inclusive block range sent to the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start_block: u64,
    pub end_block: u64,
}

impl BlockRange {
    pub fn new(start_block: u64, end_block: u64) -> Self {
        Self {
            start_block,
            end_block,
        }
    }
}

impl Default for BlockRange {
    fn default() -> Self {
        Self::new(0, DEFAULT_END_BLOCK)
    }
}

/// One collection request. Built once, then only read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub address: String,
    pub chain: String,
    pub kind: RecordKind,
    pub time_window: Option<TimeWindow>,
    pub block_range: Option<BlockRange>,
    pub page_size: u32,
    pub topic0: Option<String>,
    pub sort: SortOrder,
}

impl Query {
    /// Query at the provider's maximum page size for `kind`, no window, descending.
    pub fn new(address: impl Into<String>, chain: impl Into<String>, kind: RecordKind) -> Self {
        Self {
            address: address.into(),
            chain: chain.into(),
            kind,
            time_window: None,
            block_range: None,
            page_size: kind.max_page_size(),
            topic0: None,
            sort: SortOrder::Desc,
        }
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_block_range(mut self, range: BlockRange) -> Self {
        self.block_range = Some(range);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_topic0(mut self, topic0: impl Into<String>) -> Self {
        self.topic0 = Some(topic0.into());
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Page size clamped into `1..=max` for the record kind.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, self.kind.max_page_size())
    }

    pub fn effective_block_range(&self) -> BlockRange {
        self.block_range.unwrap_or_default()
    }
}
