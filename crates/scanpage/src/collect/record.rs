//! Provider record passed through with a derived `datetime` field.

use crate::chain::{format_datetime, parse_unix_field};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TIMESTAMP_FIELD: &str = "timeStamp";
pub const DATETIME_FIELD: &str = "datetime";

/// One provider record. Field names and values are whatever the provider sent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Wrap a raw provider object, adding `datetime` when `timeStamp` parses.
    pub fn from_provider(mut fields: Map<String, Value>) -> Self {
        let derived = fields
            .get(TIMESTAMP_FIELD)
            .and_then(|v| parse_unix_field(v).ok())
            .and_then(|ts| format_datetime(ts).ok());
        if let Some(dt) = derived {
            fields.insert(DATETIME_FIELD.to_string(), Value::String(dt));
        }
        Self(fields)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.0
            .get(TIMESTAMP_FIELD)
            .and_then(|v| parse_unix_field(v).ok())
    }

    /// Transaction hash (`hash` for account endpoints, `transactionHash` for logs).
    pub fn hash(&self) -> Option<&str> {
        self.0
            .get("hash")
            .or_else(|| self.0.get("transactionHash"))
            .and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}
