//! Supported chains, endpoint table, HTTP fetching, caching and rate limiting.

mod cache;
pub(crate) mod fetch;
mod limiter;
mod normalize;

pub use cache::{Cache, CacheError};
pub use fetch::{FetchConfig, FetchError, Fetcher, HttpResponse, HttpTransport, Transport, TransportError};
pub use limiter::RateLimiter;
pub use normalize::{
    estimate_block_range, format_datetime, lookback_window, parse_time_bound, parse_unix_field,
    NormalizeError,
};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Shared fallback key; most Etherscan-family explorers accept it through the v2 gateway.
pub const DEFAULT_API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported chain: {0}")]
pub struct UnknownChain(pub String);

/// Networks served by an Etherscan-family explorer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Optimism,
    Polygon,
    Base,
    Avalanche,
    Bsc,
    Fantom,
}

impl Chain {
    pub const ALL: [Chain; 8] = [
        Chain::Ethereum,
        Chain::Arbitrum,
        Chain::Optimism,
        Chain::Polygon,
        Chain::Base,
        Chain::Avalanche,
        Chain::Bsc,
        Chain::Fantom,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Polygon => "polygon",
            Chain::Base => "base",
            Chain::Avalanche => "avalanche",
            Chain::Bsc => "bsc",
            Chain::Fantom => "fantom",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Chain::Ethereum => "https://api.etherscan.io/api",
            Chain::Arbitrum => "https://api.arbiscan.io/api",
            Chain::Optimism => "https://api-optimistic.etherscan.io/api",
            Chain::Polygon => "https://api.polygonscan.com/api",
            Chain::Base => "https://api.basescan.org/api",
            Chain::Avalanche => "https://api.snowtrace.io/api",
            Chain::Bsc => "https://api.bscscan.com/api",
            Chain::Fantom => "https://api.ftmscan.com/api",
        }
    }

    /// Per-explorer API key variable, checked before [`DEFAULT_API_KEY_ENV`].
    pub fn api_key_env(self) -> &'static str {
        match self {
            Chain::Ethereum => "ETHERSCAN_API_KEY",
            Chain::Arbitrum => "ARBISCAN_API_KEY",
            Chain::Optimism => "OPTIMISM_ETHERSCAN_API_KEY",
            Chain::Polygon => "POLYGONSCAN_API_KEY",
            Chain::Base => "BASESCAN_API_KEY",
            Chain::Avalanche => "SNOWTRACE_API_KEY",
            Chain::Bsc => "BSCSCAN_API_KEY",
            Chain::Fantom => "FTMSCAN_API_KEY",
        }
    }

    /// Rough block production rate, used only to narrow block ranges for time windows.
    pub fn approx_blocks_per_day(self) -> u64 {
        match self {
            Chain::Ethereum => 7_200,
            Chain::Arbitrum => 345_600,
            Chain::Optimism | Chain::Base => 43_200,
            Chain::Polygon => 43_200,
            Chain::Avalanche => 43_200,
            Chain::Bsc => 28_800,
            Chain::Fantom => 86_400,
        }
    }

    /// All supported chains are EVM: `0x` followed by 20 bytes of hex.
    pub fn is_valid_address(self, address: &str) -> bool {
        let Some(digits) = address.strip_prefix("0x").or_else(|| address.strip_prefix("0X"))
        else {
            return false;
        };
        digits.len() == 40 && hex::decode(digits).is_ok()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Chain::ALL
            .into_iter()
            .find(|c| c.name() == lower)
            .ok_or(UnknownChain(s.to_string()))
    }
}

/// Resolved explorer endpoint for one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub chain: Chain,
    pub base_url: String,
    pub api_key: String,
}

/// Chain name to endpoint mapping. Queries naming a chain absent here are unsupported.
#[derive(Clone, Debug, Default)]
pub struct ChainTable {
    endpoints: BTreeMap<Chain, Endpoint>,
}

impl ChainTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All chains with their static base URL and the same API key.
    pub fn with_api_key(api_key: &str) -> Self {
        let mut table = Self::empty();
        for chain in Chain::ALL {
            table.insert(Endpoint {
                chain,
                base_url: chain.base_url().to_string(),
                api_key: api_key.to_string(),
            });
        }
        table
    }

    /// All chains; keys from the chain's own env var, else `ETHERSCAN_API_KEY`, else empty.
    pub fn from_env() -> Self {
        let fallback = std::env::var(DEFAULT_API_KEY_ENV).unwrap_or_default();
        let mut table = Self::empty();
        for chain in Chain::ALL {
            let api_key = std::env::var(chain.api_key_env())
                .ok()
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| fallback.clone());
            table.insert(Endpoint {
                chain,
                base_url: chain.base_url().to_string(),
                api_key,
            });
        }
        table
    }

    pub fn insert(&mut self, endpoint: Endpoint) {
        self.endpoints.insert(endpoint.chain, endpoint);
    }

    /// Override the base URL for a chain (proxies, local fixtures).
    pub fn with_endpoint(mut self, chain: Chain, base_url: &str) -> Self {
        let api_key = self
            .endpoints
            .get(&chain)
            .map(|e| e.api_key.clone())
            .unwrap_or_default();
        self.insert(Endpoint {
            chain,
            base_url: base_url.to_string(),
            api_key,
        });
        self
    }

    pub fn resolve(&self, chain: &str) -> Result<&Endpoint, UnknownChain> {
        let parsed: Chain = chain.parse()?;
        self.endpoints
            .get(&parsed)
            .ok_or_else(|| UnknownChain(chain.to_string()))
    }

    pub fn chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.endpoints.keys().copied()
    }
}
