//! Paginated collection: page through an endpoint until the first short page.

use crate::chain::{estimate_block_range, Cache, ChainTable, FetchError, Fetcher};
use crate::collect::{filter_window, Query, Record, RecordKind};
use crate::provider::{EtherscanAdapter, PageAdapter, PageSignal, ProviderError};
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("unsupported chain: {0}")]
    UnsupportedChain(String),
    #[error("invalid {chain} address: {address}")]
    InvalidAddress { chain: String, address: String },
    #[error("transient failure after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },
    #[error("provider error: {message} ({detail})")]
    Provider { message: String, detail: String },
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("stopped at page ceiling of {0} pages")]
    PageLimit(u32),
    #[error("offline mode: page not cached")]
    Offline,
    #[error("{0}")]
    Io(String),
}

impl CollectError {
    /// Failures that a later run could plausibly avoid.
    pub fn is_transient(&self) -> bool {
        matches!(self, CollectError::Transient { .. })
    }
}

impl From<FetchError> for CollectError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Http { status, body } => CollectError::Http { status, body },
            FetchError::RetriesExhausted { attempts, last } => CollectError::Transient {
                attempts,
                reason: last,
            },
            FetchError::Provider(ProviderError::Application { message, detail }) => {
                CollectError::Provider { message, detail }
            }
            FetchError::Provider(ProviderError::Backpressure(m)) => CollectError::Transient {
                attempts: 1,
                reason: m,
            },
            FetchError::Provider(ProviderError::Decode(m)) => CollectError::Decode(m),
            FetchError::OfflineMiss => CollectError::Offline,
            FetchError::Transport(e) => CollectError::Io(e.to_string()),
            FetchError::Cache(e) => CollectError::Io(e.to_string()),
        }
    }
}

/// A collection that stopped early. Records gathered before the failure are kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source} (page {page}, {retrieved} records retrieved)")]
pub struct CollectionError {
    pub retrieved: usize,
    pub page: u32,
    pub source: CollectError,
}

/// Result of one `collect` call.
#[derive(Clone, Debug)]
pub struct Collection {
    pub query: Query,
    /// Page order, then provider order within each page.
    pub records: Vec<Record>,
    pub pages: u32,
    /// HTTP requests issued for this query, retries included.
    pub requests: u64,
    pub error: Option<CollectionError>,
}

impl Collection {
    fn failed(query: &Query, source: CollectError) -> Self {
        Self {
            query: query.clone(),
            records: Vec::new(),
            pages: 0,
            requests: 0,
            error: Some(CollectionError {
                retrieved: 0,
                page: 0,
                source,
            }),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Resolves queries against the chain table and pages through the provider.
pub struct Collector {
    table: ChainTable,
    fetcher: Fetcher,
    adapter: Box<dyn PageAdapter>,
}

impl Collector {
    /// Collector using the Etherscan-family adapter.
    pub fn new(table: ChainTable, fetcher: Fetcher) -> Self {
        Self {
            table,
            fetcher,
            adapter: Box::new(EtherscanAdapter::new()),
        }
    }

    pub fn with_adapter(mut self, adapter: impl PageAdapter + 'static) -> Self {
        self.adapter = Box::new(adapter);
        self
    }

    pub fn table(&self) -> &ChainTable {
        &self.table
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Collect every record matching `query`. Never fails outright: problems are
    /// reported on [`Collection::error`] alongside whatever was retrieved.
    pub async fn collect(&self, query: &Query) -> Collection {
        let endpoint = match self.table.resolve(&query.chain) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(chain = %query.chain, address = %query.address, "{e}");
                return Collection::failed(query, CollectError::UnsupportedChain(e.0));
            }
        };
        if !endpoint.chain.is_valid_address(&query.address) {
            warn!(chain = %endpoint.chain, address = %query.address, "invalid address");
            return Collection::failed(
                query,
                CollectError::InvalidAddress {
                    chain: endpoint.chain.to_string(),
                    address: query.address.clone(),
                },
            );
        }

        let page_size = query.effective_page_size();
        if page_size != query.page_size {
            debug!(requested = query.page_size, page_size, "page size clamped");
        }
        let config = self.fetcher.config();
        let max_pages = config.max_pages.max(1);
        let page_delay = Duration::from_millis(config.page_delay_ms);
        let adapter = self.adapter.as_ref();
        let requests_before = self.fetcher.request_count();

        let mut records: Vec<Record> = Vec::new();
        let mut pages = 0u32;
        let mut page = 1u32;
        let mut error = None;
        loop {
            if page > max_pages {
                error = Some(CollectionError {
                    retrieved: records.len(),
                    page,
                    source: CollectError::PageLimit(max_pages),
                });
                break;
            }
            let params = adapter.page_params(query, page, page_size, &endpoint.api_key);
            let cache_key = Cache::key_for_request(&endpoint.base_url, &params);
            let fetched = self
                .fetcher
                .fetch(&endpoint.base_url, &params, Some(&cache_key), |body| {
                    adapter.parse_page(body)
                })
                .await;
            match fetched {
                Ok(PageSignal::Empty) => {
                    pages += 1;
                    debug!(page, "no records, last page");
                    break;
                }
                Ok(PageSignal::Records(raw)) => {
                    pages += 1;
                    let raw_len = raw.len();
                    let kept = match &query.time_window {
                        Some(window) => filter_window(raw, window),
                        None => raw,
                    };
                    records.extend(kept);
                    debug!(page, raw_len, total = records.len(), "page fetched");
                    if raw_len < page_size as usize {
                        break;
                    }
                    page += 1;
                    tokio::time::sleep(page_delay).await;
                }
                Err(e) => {
                    error = Some(CollectionError {
                        retrieved: records.len(),
                        page,
                        source: e.into(),
                    });
                    break;
                }
            }
        }

        let requests = self.fetcher.request_count() - requests_before;
        match &error {
            None => info!(
                chain = %endpoint.chain,
                address = %query.address,
                kind = %query.kind,
                records = records.len(),
                pages,
                requests,
                "collection complete"
            ),
            Some(e) => warn!(
                chain = %endpoint.chain,
                address = %query.address,
                kind = %query.kind,
                records = records.len(),
                pages,
                requests,
                error = %e,
                "collection stopped early"
            ),
        }
        Collection {
            query: query.clone(),
            records,
            pages,
            requests,
            error,
        }
    }

    /// Latest block number on `chain`, for turning time windows into block ranges.
    pub async fn head_block(&self, chain: &str) -> Result<u64, CollectError> {
        let endpoint = self
            .table
            .resolve(chain)
            .map_err(|e| CollectError::UnsupportedChain(e.0))?;
        let adapter = self.adapter.as_ref();
        let params = adapter
            .head_block_params(&endpoint.api_key)
            .ok_or_else(|| CollectError::Decode("provider has no head block lookup".into()))?;
        let head = self
            .fetcher
            .fetch(&endpoint.base_url, &params, None, |body| {
                adapter.parse_head_block(body)
            })
            .await?;
        Ok(head)
    }

    /// Bound a windowed event query to the blocks its window roughly covers.
    ///
    /// Only event queries without an explicit block range are touched. If the head
    /// block cannot be fetched the query keeps the full range; the client-side
    /// window filter still decides which logs are kept.
    pub async fn narrow_block_range(&self, query: Query, now: OffsetDateTime) -> Query {
        let window = match query.time_window {
            Some(w) if query.kind == RecordKind::Event && query.block_range.is_none() => w,
            _ => return query,
        };
        let chain = match self.table.resolve(&query.chain) {
            Ok(endpoint) => endpoint.chain,
            Err(_) => return query,
        };
        match self.head_block(&query.chain).await {
            Ok(head) => {
                let range = estimate_block_range(&window, chain, head, now);
                debug!(chain = %chain, head, start = range.start_block, "narrowed event range");
                query.with_block_range(range)
            }
            Err(e) => {
                warn!(chain = %chain, error = %e, "head block lookup failed; scanning all blocks");
                query
            }
        }
    }
}
