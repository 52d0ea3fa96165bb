//! Etherscan-family `account` / `logs` API adapter.

use crate::collect::{Query, Record, RecordKind};
use crate::provider::{PageAdapter, PageSignal, ProviderError};
use serde_json::Value;
use std::sync::Arc;

const STATUS_OK: &str = "1";
const BACKPRESSURE_MARKERS: [&str; 4] = ["rate limit", "max calls per sec", "too many", "throttl"];

type BackpressureFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Default backpressure check: a non-success status whose `message` or `result`
/// text talks about rate limiting.
pub fn default_backpressure(raw: &Value) -> bool {
    if raw.get("status").and_then(Value::as_str) == Some(STATUS_OK) {
        return false;
    }
    ["message", "result"]
        .iter()
        .filter_map(|k| raw.get(*k).and_then(Value::as_str))
        .map(str::to_ascii_lowercase)
        .any(|text| BACKPRESSURE_MARKERS.iter().any(|m| text.contains(m)))
}

fn is_no_records(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.starts_with("no ") && m.contains("found")
}

#[derive(Clone)]
pub struct EtherscanAdapter {
    backpressure: BackpressureFn,
}

impl Default for EtherscanAdapter {
    fn default() -> Self {
        Self {
            backpressure: Arc::new(default_backpressure),
        }
    }
}

impl std::fmt::Debug for EtherscanAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtherscanAdapter").finish_non_exhaustive()
    }
}

impl EtherscanAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backpressure predicate.
    pub fn with_backpressure(
        mut self,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.backpressure = Arc::new(predicate);
        self
    }
}

impl PageAdapter for EtherscanAdapter {
    fn page_params(
        &self,
        query: &Query,
        page: u32,
        page_size: u32,
        api_key: &str,
    ) -> Vec<(String, String)> {
        let range = query.effective_block_range();
        let mut params: Vec<(&str, String)> = match query.kind {
            RecordKind::Transaction | RecordKind::InternalTransaction => {
                let action = if query.kind == RecordKind::Transaction {
                    "txlist"
                } else {
                    "txlistinternal"
                };
                vec![
                    ("module", "account".to_string()),
                    ("action", action.to_string()),
                    ("address", query.address.clone()),
                    ("startblock", range.start_block.to_string()),
                    ("endblock", range.end_block.to_string()),
                    ("page", page.to_string()),
                    ("offset", page_size.to_string()),
                    ("sort", query.sort.as_str().to_string()),
                ]
            }
            RecordKind::Event => {
                let mut p = vec![
                    ("module", "logs".to_string()),
                    ("action", "getLogs".to_string()),
                    ("address", query.address.clone()),
                    ("fromBlock", range.start_block.to_string()),
                    ("toBlock", range.end_block.to_string()),
                    ("page", page.to_string()),
                    ("offset", page_size.to_string()),
                ];
                if let Some(topic0) = &query.topic0 {
                    p.push(("topic0", topic0.clone()));
                }
                p
            }
        };
        params.push(("apikey", api_key.to_string()));
        params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn is_backpressure(&self, raw: &Value) -> bool {
        (self.backpressure)(raw)
    }

    fn parse_page(&self, body: &str) -> Result<PageSignal, ProviderError> {
        let raw: Value =
            serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        if self.is_backpressure(&raw) {
            let text = raw
                .get("result")
                .and_then(Value::as_str)
                .or_else(|| raw.get("message").and_then(Value::as_str))
                .unwrap_or_default();
            return Err(ProviderError::Backpressure(text.to_string()));
        }
        let status = raw.get("status").and_then(Value::as_str).unwrap_or_default();
        let message = raw
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let result = raw.get("result").cloned().unwrap_or(Value::Null);

        if status != STATUS_OK {
            if is_no_records(&message) {
                return Ok(PageSignal::Empty);
            }
            let detail = match result {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            return Err(ProviderError::Application { message, detail });
        }

        let Value::Array(items) = result else {
            return Err(ProviderError::Decode(
                "status 1 without a result array".to_string(),
            ));
        };
        let records = items
            .into_iter()
            .map(|item| match item {
                Value::Object(fields) => Ok(Record::from_provider(fields)),
                other => Err(ProviderError::Decode(format!(
                    "record is not an object: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PageSignal::Records(records))
    }

    fn head_block_params(&self, api_key: &str) -> Option<Vec<(String, String)>> {
        Some(vec![
            ("module".to_string(), "proxy".to_string()),
            ("action".to_string(), "eth_blockNumber".to_string()),
            ("apikey".to_string(), api_key.to_string()),
        ])
    }

    fn parse_head_block(&self, body: &str) -> Result<u64, ProviderError> {
        let raw: Value =
            serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        if self.is_backpressure(&raw) {
            return Err(ProviderError::Backpressure("head block".to_string()));
        }
        let hex = raw
            .get("result")
            .and_then(Value::as_str)
            .and_then(|s| s.strip_prefix("0x"))
            .ok_or_else(|| ProviderError::Decode(format!("unexpected head block body: {body}")))?;
        u64::from_str_radix(hex, 16).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}
