//! Provider adapters: request parameters in, page signal out.

mod etherscan;

pub use etherscan::{default_backpressure, EtherscanAdapter};

use crate::collect::{Query, Record};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider is asking us to slow down; retryable.
    #[error("provider backpressure: {0}")]
    Backpressure(String),
    /// Provider rejected the query itself; not retryable.
    #[error("provider error: {message} ({detail})")]
    Application { message: String, detail: String },
    #[error("decode: {0}")]
    Decode(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Backpressure(_))
    }
}

/// Parsed page of one response.
#[derive(Clone, Debug, PartialEq)]
pub enum PageSignal {
    /// Records as returned, in provider order.
    Records(Vec<Record>),
    /// Provider reported no (more) records. Terminal, not an error.
    Empty,
}

/// Isolates one provider family's request shape and response conventions.
pub trait PageAdapter: Send + Sync {
    /// Query-string parameters for `page` (1-based) of `query`.
    fn page_params(
        &self,
        query: &Query,
        page: u32,
        page_size: u32,
        api_key: &str,
    ) -> Vec<(String, String)>;

    /// Whether a decoded response is the provider signalling backpressure.
    fn is_backpressure(&self, raw: &serde_json::Value) -> bool;

    /// Classify a 2xx body.
    fn parse_page(&self, body: &str) -> Result<PageSignal, ProviderError>;

    /// Parameters for the latest block number lookup, if the provider has one.
    fn head_block_params(&self, _api_key: &str) -> Option<Vec<(String, String)>> {
        None
    }

    /// Extract the latest block number from a head-block response.
    fn parse_head_block(&self, _body: &str) -> Result<u64, ProviderError> {
        Err(ProviderError::Decode("head block lookup not supported".to_string()))
    }
}
